// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::antenna::{AntennaError, AntennaId};
use crate::rig::response::RigError;
use crate::rig::state::RigSnapshot;
use crate::tune::machine::TunePhase;
use crate::tuner::TunerError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuneError {
    #[error("a tune sequence is already running")]
    Busy,
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error("antenna switch unreachable: {0}")]
    AntennaUnreachable(String),
    #[error("antenna {0} was not confirmed by the relay")]
    AntennaNotConfirmed(AntennaId),
    #[error("tuner invocation failed: {0}")]
    TunerInvocationFailed(String),
    #[error("tune sequence cancelled")]
    Cancelled,
}

impl TuneError {
    /// Short machine-readable name used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Rig(e) => e.code(),
            Self::AntennaUnreachable(_) => "antenna_unreachable",
            Self::AntennaNotConfirmed(_) => "antenna_not_confirmed",
            Self::TunerInvocationFailed(_) => "tuner_invocation_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<AntennaError> for TuneError {
    fn from(e: AntennaError) -> Self {
        match e {
            AntennaError::Unreachable(reason) => Self::AntennaUnreachable(reason),
            other => Self::AntennaUnreachable(other.to_string()),
        }
    }
}

impl From<TunerError> for TuneError {
    fn from(e: TunerError) -> Self {
        Self::TunerInvocationFailed(e.to_string())
    }
}

/// Non-fatal conditions carried on a successful outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TuneAdvisory {
    /// The tuner never left the tuning state within the polling bound.
    TimedOut { polls: u32 },
}

impl fmt::Display for TuneAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { polls } => {
                write!(f, "tuner still busy after {polls} status polls")
            }
        }
    }
}

/// Result of a sequence that reached `done`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneOutcome {
    /// The tuner reported completion before the polling bound.
    pub tuned: bool,
    pub swr: Option<f32>,
    /// The relay was moved to the tuning antenna and confirmed there.
    pub antenna_switched: bool,
    /// The original antenna was confirmed after the sequence.
    pub antenna_restored: bool,
    pub advisory: Option<TuneAdvisory>,
    pub snapshot: RigSnapshot,
}

impl TuneOutcome {
    pub fn message(&self) -> String {
        let mut message = if self.tuned {
            "Tune complete".to_string()
        } else {
            "Tune finished without confirmation from the tuner".to_string()
        };
        if let Some(swr) = self.swr {
            message.push_str(&format!(", SWR {swr:.2}"));
        }
        if let Some(advisory) = &self.advisory {
            message.push_str(&format!(" ({advisory})"));
        }
        message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    KeyDown,
    RestoreMode,
    RestorePower,
    RestoreFrequency,
    RestoreAntenna,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupStep {
    pub action: CleanupAction,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort cleanup steps in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleanupReport {
    steps: Vec<CleanupStep>,
}

impl CleanupReport {
    pub fn record<E: fmt::Display>(&mut self, action: CleanupAction, result: Result<(), E>) {
        self.steps.push(CleanupStep {
            action,
            ok: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    pub fn steps(&self) -> &[CleanupStep] {
        &self.steps
    }

    pub fn step(&self, action: CleanupAction) -> Option<&CleanupStep> {
        self.steps.iter().find(|step| step.action == action)
    }

    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|step| step.ok)
    }
}

/// Result of a sequence that ended in `failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneFailure {
    pub error: TuneError,
    /// Phase the sequence was in when the error happened.
    pub phase: TunePhase,
    /// How long the sequence had been in `phase`.
    pub time_in_phase: Option<Duration>,
    pub cleanup_attempted: bool,
    pub cleanup: CleanupReport,
}

impl TuneFailure {
    /// Failure raised before anything on the rig or antenna was touched.
    pub fn before_start(error: TuneError) -> Self {
        Self {
            error,
            phase: TunePhase::Idle,
            time_in_phase: None,
            cleanup_attempted: false,
            cleanup: CleanupReport::default(),
        }
    }
}

impl fmt::Display for TuneFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (phase {})", self.error, self.phase)
    }
}

impl std::error::Error for TuneFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

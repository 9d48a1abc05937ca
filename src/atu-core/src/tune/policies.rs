// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Tune sequence policies: timings, polling bounds and the tune profile.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::antenna::{AntennaId, DEFAULT_CONFIRM_ATTEMPTS};

pub const DEFAULT_TUNING_ANTENNA: &str = "590";
pub const DEFAULT_TUNE_POWER: f32 = 0.10;
pub const DEFAULT_TUNE_MODE: &str = "RTTY";

/// What to do when the antenna service cannot be reached or the relay does
/// not confirm the tuning antenna.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntennaPolicy {
    /// Fail before keying.
    #[default]
    Abort,
    /// Log a warning and tune on whatever antenna is connected.
    Proceed,
}

/// Fixed waits between steps. Never retried, never shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_power: Duration,
    pub after_mode: Duration,
    pub after_key_up: Duration,
    pub after_trigger: Duration,
    pub after_key_down: Duration,
    pub after_mode_restore: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_power: Duration::from_millis(500),
            after_mode: Duration::from_millis(800),
            after_key_up: Duration::from_millis(2000),
            after_trigger: Duration::from_millis(1000),
            after_key_down: Duration::from_millis(500),
            after_mode_restore: Duration::from_millis(300),
        }
    }
}

/// Bound on tuner completion polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolling {
    pub max_polls: u32,
    pub interval: Duration,
}

impl Default for CompletionPolling {
    fn default() -> Self {
        Self {
            max_polls: 40,
            interval: Duration::from_millis(500),
        }
    }
}

impl CompletionPolling {
    /// Upper bound on time spent polling.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_polls)
    }
}

/// Everything a tune sequence needs to know besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneProfile {
    pub tuning_antenna: AntennaId,
    /// RF power during the carrier, as a fraction of full output.
    pub power: f32,
    pub mode: String,
    pub passband: i32,
    pub confirm_attempts: u32,
    pub cleanup_confirm_attempts: u32,
    pub antenna_policy: AntennaPolicy,
    pub restore_frequency: bool,
    pub read_swr: bool,
    pub delays: SettleDelays,
    pub polling: CompletionPolling,
}

impl Default for TuneProfile {
    fn default() -> Self {
        Self {
            tuning_antenna: AntennaId::from(DEFAULT_TUNING_ANTENNA),
            power: DEFAULT_TUNE_POWER,
            mode: DEFAULT_TUNE_MODE.to_string(),
            passband: 0,
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            cleanup_confirm_attempts: 5,
            antenna_policy: AntennaPolicy::Abort,
            restore_frequency: false,
            read_swr: true,
            delays: SettleDelays::default(),
            polling: CompletionPolling::default(),
        }
    }
}

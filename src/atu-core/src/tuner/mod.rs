// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Antenna tuner controller.
//!
//! The tuner is driven by an external program taking one command argument
//! and printing a human-readable report.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

pub mod status;

pub use status::{parse_tuning, DisplayConvention, TunerFlags, TunerMode};

pub const DEFAULT_TUNER_PROGRAM: &str = "/home/pi/atu-controller/atu_gpio.py";
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunerCommand {
    /// Start a tune cycle. Returns immediately.
    Tune,
    /// Report whether a tune cycle is running.
    Status,
    /// Report the auto/bypass flags.
    State,
    /// Toggle auto mode.
    Auto,
    /// Toggle bypass.
    Bypass,
    Reset,
}

impl TunerCommand {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Tune => "tune",
            Self::Status => "status",
            Self::State => "state",
            Self::Auto => "auto",
            Self::Bypass => "bypass",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for TunerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for TunerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tune" => Ok(Self::Tune),
            "status" => Ok(Self::Status),
            "state" => Ok(Self::State),
            "auto" => Ok(Self::Auto),
            "bypass" => Ok(Self::Bypass),
            "reset" => Ok(Self::Reset),
            other => Err(format!("unknown tuner command '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunerError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("{program} {command} exited with {status}: {stderr}")]
    Failed {
        program: String,
        command: TunerCommand,
        status: String,
        stderr: String,
    },
    #[error("{program} {command} did not finish within {timeout_ms}ms")]
    Timeout {
        program: String,
        command: TunerCommand,
        timeout_ms: u64,
    },
}

pub type TunerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TunerError>> + Send + 'a>>;

/// Runs one tuner command and returns its standard output.
pub trait TunerInvoker: Send + Sync {
    fn invoke(&self, command: TunerCommand) -> TunerFuture<'_, String>;
}

impl<T: TunerInvoker + ?Sized> TunerInvoker for Arc<T> {
    fn invoke(&self, command: TunerCommand) -> TunerFuture<'_, String> {
        (**self).invoke(command)
    }
}

/// Tuner controller run as a child process per command.
#[derive(Debug, Clone)]
pub struct ProcessTuner {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessTuner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }

    /// Arguments placed before the command word.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl TunerInvoker for ProcessTuner {
    fn invoke(&self, command: TunerCommand) -> TunerFuture<'_, String> {
        Box::pin(async move {
            let program = self.program.display().to_string();
            let run = Command::new(&self.program)
                .args(&self.args)
                .arg(command.as_arg())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output();

            let output = match time::timeout(self.timeout, run).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(TunerError::Spawn {
                        program,
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(TunerError::Timeout {
                        program,
                        command,
                        timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            };

            if !output.status.success() {
                return Err(TunerError::Failed {
                    program,
                    command,
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            debug!("Tuner {} -> {:?}", command, stdout.trim());
            Ok(stdout)
        })
    }
}

/// Combined tuner view: mode flags plus the tuning flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerReport {
    pub tuning: bool,
    pub auto: bool,
    pub bypass: bool,
    pub mode: TunerMode,
    pub display: char,
}

/// Query `state` then `status`. A failing `status` reads as not tuning.
pub async fn full_status<T>(tuner: &T, convention: DisplayConvention) -> Result<TunerReport, TunerError>
where
    T: TunerInvoker + ?Sized,
{
    let flags = TunerFlags::parse(&tuner.invoke(TunerCommand::State).await?);
    let tuning = match tuner.invoke(TunerCommand::Status).await {
        Ok(output) => parse_tuning(&output).unwrap_or(false),
        Err(e) => {
            debug!("Tuner status unavailable: {}", e);
            false
        }
    };
    let mode = flags.mode();
    Ok(TunerReport {
        tuning,
        auto: flags.auto,
        bypass: flags.bypass,
        mode,
        display: convention.symbol(mode),
    })
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single exchange with the rig daemon.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RigError {
    /// No connection to the daemon; reconnect is pending.
    #[error("rig link is down")]
    LinkDown,
    /// Another command or session currently owns the link.
    #[error("rig link is busy with another command")]
    Busy,
    #[error("no reply from rig daemon within {0}ms")]
    Timeout(u64),
    #[error("unexpected reply from rig daemon: {0}")]
    Protocol(String),
    /// Daemon answered `RPRT <code>` with a non-zero code.
    #[error("rig daemon rejected command (RPRT {0})")]
    Rejected(i32),
}

pub type RigResult<T> = Result<T, RigError>;

impl RigError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(u64::try_from(after.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether a later attempt may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LinkDown | Self::Busy | Self::Timeout(_))
    }

    /// Short machine-readable name used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LinkDown => "link_down",
            Self::Busy => "busy",
            Self::Timeout(_) => "timeout",
            Self::Protocol(_) => "protocol",
            Self::Rejected(_) => "rejected",
        }
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Antenna relay control through the station HTTP service.
//!
//! The service owns the relay. A successful select request only means the
//! command was accepted; the relay position is confirmed by polling status.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

pub const DEFAULT_STATION_URL: &str = "http://radio.local";
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 10;
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_millis(100);

/// Identifier of an antenna port as the station service names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AntennaId(String);

impl AntennaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AntennaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AntennaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AntennaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for AntennaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => Self(id),
            Raw::Number(id) => Self(id.to_string()),
        })
    }
}

/// Antenna status as reported by the station service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaState {
    pub selected: AntennaId,
    #[serde(default)]
    pub relay_ok: bool,
    /// Auxiliary relay state, passed through untouched.
    #[serde(rename = "hf_state", default)]
    pub aux_state: serde_json::Value,
}

impl AntennaState {
    /// The relay reports `expected` as selected and settled.
    pub fn confirms(&self, expected: &AntennaId) -> bool {
        self.relay_ok && self.selected == *expected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AntennaError {
    #[error("station control unreachable: {0}")]
    Unreachable(String),
    #[error("station control answered HTTP {status} to {request}")]
    Http { request: String, status: u16 },
    #[error("station control sent an invalid antenna status: {0}")]
    InvalidStatus(String),
}

impl AntennaError {
    fn into_unreachable(self) -> Self {
        match self {
            Self::Unreachable(_) => self,
            other => Self::Unreachable(other.to_string()),
        }
    }
}

pub type AntennaFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AntennaError>> + Send + 'a>>;

/// Query and move the antenna relay.
pub trait AntennaSwitch: Send + Sync {
    fn status(&self) -> AntennaFuture<'_, AntennaState>;

    /// Request a relay change. Does not wait for the relay to move.
    fn select(&self, id: AntennaId) -> AntennaFuture<'_, ()>;

    fn confirm_interval(&self) -> Duration {
        DEFAULT_CONFIRM_INTERVAL
    }

    /// Poll status until `expected` is selected with the relay settled.
    ///
    /// Returns `Ok(false)` once `max_attempts` polls pass without a match.
    /// Errors on intermediate polls are logged and polling continues; an error
    /// on the final poll is returned as [`AntennaError::Unreachable`].
    fn wait_for_confirmation(
        &self,
        expected: AntennaId,
        max_attempts: u32,
    ) -> AntennaFuture<'_, bool> {
        Box::pin(async move {
            for attempt in 1..=max_attempts {
                match self.status().await {
                    Ok(state) if state.confirms(&expected) => {
                        debug!(
                            "Antenna {} confirmed after {} poll(s)",
                            expected, attempt
                        );
                        return Ok(true);
                    }
                    Ok(state) => debug!(
                        "Antenna confirm {}/{}: selected={} relay_ok={}",
                        attempt, max_attempts, state.selected, state.relay_ok
                    ),
                    Err(e) if attempt == max_attempts => return Err(e.into_unreachable()),
                    Err(e) => warn!(
                        "Antenna status poll {}/{} failed: {}",
                        attempt, max_attempts, e
                    ),
                }
                if attempt < max_attempts {
                    time::sleep(self.confirm_interval()).await;
                }
            }
            Ok(false)
        })
    }
}

impl<T: AntennaSwitch + ?Sized> AntennaSwitch for Arc<T> {
    fn status(&self) -> AntennaFuture<'_, AntennaState> {
        (**self).status()
    }

    fn select(&self, id: AntennaId) -> AntennaFuture<'_, ()> {
        (**self).select(id)
    }

    fn confirm_interval(&self) -> Duration {
        (**self).confirm_interval()
    }

    fn wait_for_confirmation(
        &self,
        expected: AntennaId,
        max_attempts: u32,
    ) -> AntennaFuture<'_, bool> {
        (**self).wait_for_confirmation(expected, max_attempts)
    }
}

/// HTTP client for the station service.
#[derive(Debug, Clone)]
pub struct AntennaCoordinator {
    http: reqwest::Client,
    base_url: String,
    confirm_interval: Duration,
}

impl AntennaCoordinator {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, AntennaError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AntennaError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_confirm_interval(mut self, interval: Duration) -> Self {
        self.confirm_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/api/antenna/{}", self.base_url.trim_end_matches('/'), tail)
    }
}

impl AntennaSwitch for AntennaCoordinator {
    fn status(&self) -> AntennaFuture<'_, AntennaState> {
        Box::pin(async move {
            let url = self.url("status");
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| AntennaError::Unreachable(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(AntennaError::Http {
                    request: format!("GET {url}"),
                    status: status.as_u16(),
                });
            }
            response
                .json::<AntennaState>()
                .await
                .map_err(|e| AntennaError::InvalidStatus(e.to_string()))
        })
    }

    fn select(&self, id: AntennaId) -> AntennaFuture<'_, ()> {
        Box::pin(async move {
            let url = self.url(id.as_str());
            let response = self
                .http
                .post(&url)
                .send()
                .await
                .map_err(|e| AntennaError::Unreachable(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(AntennaError::Http {
                    request: format!("POST {url}"),
                    status: status.as_u16(),
                });
            }
            debug!("Antenna {} requested", id);
            Ok(())
        })
    }

    fn confirm_interval(&self) -> Duration {
        self.confirm_interval
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for atu-server.
//!
//! Config is loaded from the `[atu-server]` section of `atu-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `$ATU_RS_CONFIG`
//! 3. `./atu-rs.toml`
//! 4. `~/.config/atu-rs/atu-rs.toml`
//! 5. `/etc/atu-rs/atu-rs.toml`

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use atu_app::{ConfigError, ConfigLoader, Loaded};
use atu_core::antenna::DEFAULT_STATION_URL;
use atu_core::rig::endpoint::{RigEndpoint, DEFAULT_RIGCTLD_PORT};
use atu_core::tune::{AntennaPolicy, CompletionPolling, SettleDelays, TuneProfile};
use atu_core::tuner::{DisplayConvention, DEFAULT_TUNER_PROGRAM};
use atu_core::{AntennaId, RigLinkConfig};

/// Section of `atu-rs.toml` read by the server.
pub const SECTION: &str = "atu-server";

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    /// rigctld connection
    pub rig: RigConfig,
    /// Station service and antenna relay
    pub antenna: AntennaConfig,
    /// Tuner controller program
    pub tuner: TunerConfig,
    /// Tune sequence parameters
    pub tune: TuneConfig,
    /// HTTP listener
    pub listen: ListenConfig,
    /// Rig status polling
    pub telemetry: TelemetryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// rigctld connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub host: String,
    pub port: u16,
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Quiet period after a timed-out command before the next one is sent
    pub resync_window_ms: u64,
}

impl Default for RigConfig {
    fn default() -> Self {
        let link = RigLinkConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RIGCTLD_PORT,
            command_timeout_ms: millis(link.command_timeout),
            connect_timeout_ms: millis(link.connect_timeout),
            reconnect_delay_ms: millis(link.reconnect_delay),
            resync_window_ms: millis(link.resync_window),
        }
    }
}

/// Station service and antenna relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntennaConfig {
    /// Base URL of the station service
    pub base_url: String,
    /// Antenna port wired through the tuner
    pub tuning_antenna: String,
    pub confirm_attempts: u32,
    pub confirm_interval_ms: u64,
    /// Confirmation attempts when putting the antenna back after a failure
    pub cleanup_confirm_attempts: u32,
    pub request_timeout_ms: u64,
    /// "abort" or "proceed" when the relay is unreachable or unconfirmed
    pub on_unreachable: AntennaPolicy,
}

impl Default for AntennaConfig {
    fn default() -> Self {
        let profile = TuneProfile::default();
        Self {
            base_url: DEFAULT_STATION_URL.to_string(),
            tuning_antenna: profile.tuning_antenna.to_string(),
            confirm_attempts: profile.confirm_attempts,
            confirm_interval_ms: 100,
            cleanup_confirm_attempts: profile.cleanup_confirm_attempts,
            request_timeout_ms: 2000,
            on_unreachable: profile.antenna_policy,
        }
    }
}

/// Tuner controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub program: PathBuf,
    /// Extra arguments placed before the command word
    pub args: Vec<String>,
    pub invoke_timeout_ms: u64,
    /// Meaning of the dot on the tuner display
    pub display_convention: DisplayConvention,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_TUNER_PROGRAM),
            args: Vec::new(),
            invoke_timeout_ms: 10_000,
            display_convention: DisplayConvention::default(),
        }
    }
}

/// Tune sequence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    /// Carrier power as a fraction of full output
    pub power: f32,
    pub mode: String,
    pub passband: i32,
    pub restore_frequency: bool,
    pub read_swr: bool,
    pub completion_polls: u32,
    pub completion_interval_ms: u64,
    pub settle: SettleConfig,
}

impl Default for TuneConfig {
    fn default() -> Self {
        let profile = TuneProfile::default();
        Self {
            power: profile.power,
            mode: profile.mode,
            passband: profile.passband,
            restore_frequency: profile.restore_frequency,
            read_swr: profile.read_swr,
            completion_polls: profile.polling.max_polls,
            completion_interval_ms: millis(profile.polling.interval),
            settle: SettleConfig::default(),
        }
    }
}

/// Fixed waits between tune steps, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub power_ms: u64,
    pub mode_ms: u64,
    pub key_up_ms: u64,
    pub trigger_ms: u64,
    pub key_down_ms: u64,
    pub mode_restore_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        let delays = SettleDelays::default();
        Self {
            power_ms: millis(delays.after_power),
            mode_ms: millis(delays.after_mode),
            key_up_ms: millis(delays.after_key_up),
            trigger_ms: millis(delays.after_trigger),
            key_down_ms: millis(delays.after_key_down),
            mode_restore_ms: millis(delays.after_mode_restore),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            port: 3000,
        }
    }
}

/// Rig status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.rig.host.trim().is_empty() {
            return Err("[rig].host must not be empty".to_string());
        }
        if self.rig.port == 0 {
            return Err("[rig].port must be > 0".to_string());
        }
        validate_positive("[rig].command_timeout_ms", self.rig.command_timeout_ms)?;
        validate_positive("[rig].connect_timeout_ms", self.rig.connect_timeout_ms)?;
        validate_positive("[rig].reconnect_delay_ms", self.rig.reconnect_delay_ms)?;

        let base_url = self.antenna.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(format!(
                "[antenna].base_url '{}' must start with http:// or https://",
                self.antenna.base_url
            ));
        }
        if self.antenna.tuning_antenna.trim().is_empty() {
            return Err("[antenna].tuning_antenna must not be empty".to_string());
        }
        if self.antenna.confirm_attempts == 0 {
            return Err("[antenna].confirm_attempts must be > 0".to_string());
        }
        if self.antenna.cleanup_confirm_attempts == 0 {
            return Err("[antenna].cleanup_confirm_attempts must be > 0".to_string());
        }
        validate_positive("[antenna].request_timeout_ms", self.antenna.request_timeout_ms)?;

        if self.tuner.program.as_os_str().is_empty() {
            return Err("[tuner].program must not be empty".to_string());
        }
        validate_positive("[tuner].invoke_timeout_ms", self.tuner.invoke_timeout_ms)?;

        if !(self.tune.power > 0.0 && self.tune.power <= 1.0) {
            return Err("[tune].power must be in range (0, 1]".to_string());
        }
        if self.tune.mode.trim().is_empty() || self.tune.mode.contains(char::is_whitespace) {
            return Err("[tune].mode must be a single rigctld mode name".to_string());
        }
        if self.tune.passband < 0 {
            return Err("[tune].passband must be >= 0".to_string());
        }
        if self.tune.completion_polls == 0 {
            return Err("[tune].completion_polls must be > 0".to_string());
        }
        validate_positive("[tune].completion_interval_ms", self.tune.completion_interval_ms)?;

        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }
        if self.telemetry.enabled {
            validate_positive("[telemetry].interval_ms", self.telemetry.interval_ms)?;
        }

        Ok(())
    }

    pub fn loader() -> ConfigLoader {
        ConfigLoader::new(SECTION)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::loader().load_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no file carries `[atu-server]`.
    pub fn load_from_default_paths() -> Result<Loaded<Self>, ConfigError> {
        Self::loader().discover()
    }

    pub fn rig_endpoint(&self) -> RigEndpoint {
        RigEndpoint::new(self.rig.host.trim(), self.rig.port)
    }

    pub fn link_config(&self) -> RigLinkConfig {
        RigLinkConfig {
            connect_timeout: Duration::from_millis(self.rig.connect_timeout_ms),
            command_timeout: Duration::from_millis(self.rig.command_timeout_ms),
            reconnect_delay: Duration::from_millis(self.rig.reconnect_delay_ms),
            resync_window: Duration::from_millis(self.rig.resync_window_ms),
        }
    }

    pub fn tune_profile(&self) -> TuneProfile {
        let settle = &self.tune.settle;
        TuneProfile {
            tuning_antenna: AntennaId::new(self.antenna.tuning_antenna.trim()),
            power: self.tune.power,
            mode: self.tune.mode.trim().to_string(),
            passband: self.tune.passband,
            confirm_attempts: self.antenna.confirm_attempts,
            cleanup_confirm_attempts: self.antenna.cleanup_confirm_attempts,
            antenna_policy: self.antenna.on_unreachable,
            restore_frequency: self.tune.restore_frequency,
            read_swr: self.tune.read_swr,
            delays: SettleDelays {
                after_power: Duration::from_millis(settle.power_ms),
                after_mode: Duration::from_millis(settle.mode_ms),
                after_key_up: Duration::from_millis(settle.key_up_ms),
                after_trigger: Duration::from_millis(settle.trigger_ms),
                after_key_down: Duration::from_millis(settle.key_down_ms),
                after_mode_restore: Duration::from_millis(settle.mode_restore_ms),
            },
            polling: CompletionPolling {
                max_polls: self.tune.completion_polls,
                interval: Duration::from_millis(self.tune.completion_interval_ms),
            },
        }
    }

    /// Generate an example configuration wrapped under the `[atu-server]`
    /// section header, suitable for use in a combined `atu-rs.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "atu-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            ..ServerConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_positive(path: &str, value: u64) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{path} must be > 0"));
    }
    Ok(())
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

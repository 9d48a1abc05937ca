// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::radio::freq::Freq;

/// Rig settings captured before a tune sequence and written back afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigSnapshot {
    pub mode: String,
    /// RF power as a fraction of full output.
    pub power: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<Freq>,
}

/// Periodically polled view of the rig for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigTelemetry {
    pub freq: Freq,
    pub mode: String,
    /// RF power in percent of full output.
    pub power_percent: u8,
    pub tx: bool,
    /// Unix time of the poll in milliseconds.
    pub updated_at_ms: u64,
}

impl RigTelemetry {
    pub fn power_percent_from_fraction(power: f32) -> u8 {
        (power.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_fraction_to_percent() {
        assert_eq!(RigTelemetry::power_percent_from_fraction(0.1), 10);
        assert_eq!(RigTelemetry::power_percent_from_fraction(0.456), 46);
        assert_eq!(RigTelemetry::power_percent_from_fraction(1.7), 100);
        assert_eq!(RigTelemetry::power_percent_from_fraction(-0.2), 0);
    }
}

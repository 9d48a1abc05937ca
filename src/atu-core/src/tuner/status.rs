// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Parsers for the tuner controller's text output.

use serde::{Deserialize, Serialize};

/// Marker present in `status` output while a tune cycle is running.
pub const TUNING_MARKER: &str = "TUNING";

/// Tuning flag from `status` output. Empty output carries no answer.
pub fn parse_tuning(output: &str) -> Option<bool> {
    if output.trim().is_empty() {
        None
    } else {
        Some(output.contains(TUNING_MARKER))
    }
}

/// Mode flags from `state` output (`AUTO=True` / `BYPASS=False` lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TunerFlags {
    pub auto: bool,
    pub bypass: bool,
}

impl TunerFlags {
    pub fn parse(output: &str) -> Self {
        let mut flags = Self::default();
        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let enabled = value.trim().eq_ignore_ascii_case("true");
            match key.trim() {
                "AUTO" => flags.auto = enabled,
                "BYPASS" => flags.bypass = enabled,
                _ => {}
            }
        }
        flags
    }

    /// Bypass wins over auto.
    pub fn mode(&self) -> TunerMode {
        if self.bypass {
            TunerMode::Bypass
        } else if self.auto {
            TunerMode::Auto
        } else {
            TunerMode::Manual
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TunerMode {
    Bypass,
    Auto,
    Manual,
}

/// How the tuner's front panel marks auto and manual mode.
///
/// The controller and the panel sniffer disagree on the meaning of the dot,
/// so the convention is a deployment setting until the hardware owner
/// settles it. Bypass is always `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayConvention {
    /// Dot lit in manual mode, blank in auto.
    #[default]
    DotMeansManual,
    /// Dot lit in auto mode, blank in manual.
    DotMeansAuto,
}

impl DisplayConvention {
    pub fn symbol(self, mode: TunerMode) -> char {
        match (self, mode) {
            (_, TunerMode::Bypass) => '_',
            (Self::DotMeansManual, TunerMode::Manual) | (Self::DotMeansAuto, TunerMode::Auto) => '.',
            (Self::DotMeansManual, TunerMode::Auto) | (Self::DotMeansAuto, TunerMode::Manual) => ' ',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_marker() {
        assert_eq!(
            parse_tuning("📡 Tuning Status: TUNING (Tx_req = HIGH)\n✋ Mode: MANUAL (.)\n"),
            Some(true)
        );
        assert_eq!(
            parse_tuning("✅ Tuning Status: READY (Tx_req = LOW)\n"),
            Some(false)
        );
        assert_eq!(parse_tuning("  \n"), None);
    }

    #[test]
    fn state_flags() {
        let flags = TunerFlags::parse("AUTO=True\nBYPASS=False\n");
        assert_eq!(flags, TunerFlags { auto: true, bypass: false });
        assert_eq!(flags.mode(), TunerMode::Auto);

        let flags = TunerFlags::parse("AUTO=true\nBYPASS=true\n");
        assert_eq!(flags.mode(), TunerMode::Bypass);

        let flags = TunerFlags::parse("garbage\n");
        assert_eq!(flags.mode(), TunerMode::Manual);
    }

    #[test]
    fn display_conventions() {
        let manual = DisplayConvention::DotMeansManual;
        assert_eq!(manual.symbol(TunerMode::Bypass), '_');
        assert_eq!(manual.symbol(TunerMode::Auto), ' ');
        assert_eq!(manual.symbol(TunerMode::Manual), '.');

        let auto = DisplayConvention::DotMeansAuto;
        assert_eq!(auto.symbol(TunerMode::Bypass), '_');
        assert_eq!(auto.symbol(TunerMode::Auto), '.');
        assert_eq!(auto.symbol(TunerMode::Manual), ' ');
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

/// Frequency wrapper (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freq {
    pub hz: u64,
}

impl Freq {
    #[must_use]
    pub fn new(hz: u64) -> Self {
        Self { hz }
    }

    /// Frequency in MHz, for log lines.
    #[must_use]
    pub fn mhz(&self) -> f64 {
        self.hz as f64 / 1_000_000.0
    }

    /// Parse a rigctld frequency reply.
    ///
    /// Some daemons answer with a decimal point (`14074000.000000`), so the
    /// value is read as a float and rounded to whole hertz.
    pub fn parse_hz(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(hz) = text.parse::<u64>() {
            return Some(Self { hz });
        }
        let value = text.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Self {
            hz: value.round() as u64,
        })
    }
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_and_decimal_replies() {
        assert_eq!(Freq::parse_hz("14074000"), Some(Freq::new(14_074_000)));
        assert_eq!(
            Freq::parse_hz(" 7074000.000000 "),
            Some(Freq::new(7_074_000))
        );
        assert_eq!(Freq::parse_hz("RPRT -1"), None);
        assert_eq!(Freq::parse_hz("-5"), None);
    }

    #[test]
    fn mhz_conversion() {
        assert!((Freq::new(14_074_000).mhz() - 14.074).abs() < 1e-9);
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use crate::radio::freq::Freq;

/// Transmit power level, as a fraction of full output (0.0 - 1.0).
pub const RF_POWER: &str = "RFPOWER";
/// Standing wave ratio meter.
pub const SWR: &str = "SWR";

/// Command understood by the rig daemon.
///
/// `Display` renders the rigctld wire form without the trailing newline.
#[derive(Debug, Clone, PartialEq)]
pub enum RigCommand {
    GetFreq,
    SetFreq(Freq),
    GetMode,
    SetMode { mode: String, passband: i32 },
    GetLevel(&'static str),
    SetLevel(&'static str, f32),
    GetPtt,
    SetPtt(bool),
}

impl RigCommand {
    /// Number of reply lines the daemon sends on success. `m` answers with
    /// the mode followed by the passband.
    pub fn reply_lines(&self) -> usize {
        match self {
            Self::GetMode => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for RigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetFreq => write!(f, "f"),
            Self::SetFreq(freq) => write!(f, "F {}", freq.hz),
            Self::GetMode => write!(f, "m"),
            Self::SetMode { mode, passband } => write!(f, "M {} {}", mode, passband),
            Self::GetLevel(name) => write!(f, "l {}", name),
            Self::SetLevel(name, value) => write!(f, "L {} {}", name, value),
            Self::GetPtt => write!(f, "t"),
            Self::SetPtt(ptt) => write!(f, "T {}", u8::from(*ptt)),
        }
    }
}

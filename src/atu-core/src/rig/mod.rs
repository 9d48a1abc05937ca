// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use crate::radio::freq::Freq;
use crate::rig::command::{RigCommand, RF_POWER};
use crate::{RigError, RigResult};

pub mod command;
pub mod endpoint;
pub mod link;
pub mod request;
pub mod response;
pub mod state;

/// Alias to reduce type complexity in RigControl.
pub type RigFuture<'a, T> = Pin<Box<dyn Future<Output = RigResult<T>> + Send + 'a>>;

/// rigctld operations used by the tune sequence and the control surface.
///
/// Implementors only provide [`RigControl::execute`]; the typed operations
/// build the command and parse the reply.
pub trait RigControl: Send {
    /// Send one command and return the first non-empty reply line.
    fn execute(&mut self, command: RigCommand) -> RigFuture<'_, String>;

    fn get_freq(&mut self) -> RigFuture<'_, Freq> {
        Box::pin(async move {
            let reply = self.execute(RigCommand::GetFreq).await?;
            parse_freq(&reply)
        })
    }

    fn set_freq(&mut self, freq: Freq) -> RigFuture<'_, ()> {
        self.apply(RigCommand::SetFreq(freq))
    }

    fn get_mode(&mut self) -> RigFuture<'_, String> {
        Box::pin(async move {
            let reply = self.execute(RigCommand::GetMode).await?;
            parse_mode(&reply)
        })
    }

    fn set_mode(&mut self, mode: String, passband: i32) -> RigFuture<'_, ()> {
        self.apply(RigCommand::SetMode { mode, passband })
    }

    fn get_level(&mut self, name: &'static str) -> RigFuture<'_, f32> {
        Box::pin(async move {
            let reply = self.execute(RigCommand::GetLevel(name)).await?;
            parse_level(&reply)
        })
    }

    fn set_level(&mut self, name: &'static str, value: f32) -> RigFuture<'_, ()> {
        self.apply(RigCommand::SetLevel(name, value))
    }

    /// RF power as a fraction of full output.
    fn get_power(&mut self) -> RigFuture<'_, f32> {
        self.get_level(RF_POWER)
    }

    fn set_power(&mut self, fraction: f32) -> RigFuture<'_, ()> {
        self.set_level(RF_POWER, fraction)
    }

    fn get_ptt(&mut self) -> RigFuture<'_, bool> {
        Box::pin(async move {
            let reply = self.execute(RigCommand::GetPtt).await?;
            parse_ptt(&reply)
        })
    }

    fn set_ptt(&mut self, ptt: bool) -> RigFuture<'_, ()> {
        self.apply(RigCommand::SetPtt(ptt))
    }

    /// Run a setter and check its `RPRT` reply.
    fn apply(&mut self, command: RigCommand) -> RigFuture<'_, ()> {
        Box::pin(async move {
            let reply = self.execute(command).await?;
            check_report(&reply)
        })
    }
}

fn report_code(reply: &str) -> Option<i32> {
    reply
        .trim()
        .strip_prefix("RPRT")
        .and_then(|code| code.trim().parse().ok())
}

/// Accept `RPRT 0`, map other codes to `Rejected`.
pub fn check_report(reply: &str) -> RigResult<()> {
    match report_code(reply) {
        Some(0) => Ok(()),
        Some(code) => Err(RigError::Rejected(code)),
        None => Err(RigError::protocol(format!(
            "expected RPRT after set command, got {reply:?}"
        ))),
    }
}

/// A query reply is either a value or an `RPRT <code>` error.
fn value_reply(reply: &str) -> RigResult<&str> {
    match report_code(reply) {
        Some(0) => Err(RigError::protocol("query answered without a value")),
        Some(code) => Err(RigError::Rejected(code)),
        None => Ok(reply.trim()),
    }
}

pub fn parse_freq(reply: &str) -> RigResult<Freq> {
    let value = value_reply(reply)?;
    Freq::parse_hz(value).ok_or_else(|| RigError::protocol(format!("invalid frequency {value:?}")))
}

pub fn parse_mode(reply: &str) -> RigResult<String> {
    let value = value_reply(reply)?;
    value
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| RigError::protocol("empty mode reply"))
}

pub fn parse_level(reply: &str) -> RigResult<f32> {
    let value = value_reply(reply)?;
    value
        .parse::<f32>()
        .ok()
        .filter(|level| level.is_finite())
        .ok_or_else(|| RigError::protocol(format!("invalid level {value:?}")))
}

/// Any non-zero PTT value (mic, data) counts as transmitting.
pub fn parse_ptt(reply: &str) -> RigResult<bool> {
    let value = value_reply(reply)?;
    value
        .parse::<u8>()
        .map(|ptt| ptt != 0)
        .map_err(|_| RigError::protocol(format!("invalid PTT state {value:?}")))
}

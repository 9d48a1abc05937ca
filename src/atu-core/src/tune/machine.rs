// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Tune sequence state machine.
//!
//! The forward path only ever moves ahead. Any failure leaves it for
//! [`TunePhase::Cleanup`], which always ends in [`TunePhase::Failed`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Phases of a tune sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunePhase {
    #[default]
    Idle,
    SwitchingAntenna,
    Snapshot,
    SetTunePower,
    SetTuneMode,
    KeyUp,
    TriggerTuner,
    Settle,
    PollCompletion,
    ReadSwr,
    KeyDown,
    RestoreState,
    RestoreAntenna,
    Done,
    Cleanup,
    Failed,
}

impl TunePhase {
    /// Position on the forward path. `None` for cleanup and failure.
    fn step(self) -> Option<u8> {
        let step = match self {
            Self::Idle => 0,
            Self::SwitchingAntenna => 1,
            Self::Snapshot => 2,
            Self::SetTunePower => 3,
            Self::SetTuneMode => 4,
            Self::KeyUp => 5,
            Self::TriggerTuner => 6,
            Self::Settle => 7,
            Self::PollCompletion => 8,
            Self::ReadSwr => 9,
            Self::KeyDown => 10,
            Self::RestoreState => 11,
            Self::RestoreAntenna => 12,
            Self::Done => 13,
            Self::Cleanup | Self::Failed => return None,
        };
        Some(step)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SwitchingAntenna => "switching_antenna",
            Self::Snapshot => "snapshot",
            Self::SetTunePower => "set_tune_power",
            Self::SetTuneMode => "set_tune_mode",
            Self::KeyUp => "key_up",
            Self::TriggerTuner => "trigger_tuner",
            Self::Settle => "settle",
            Self::PollCompletion => "poll_completion",
            Self::ReadSwr => "read_swr",
            Self::KeyDown => "key_down",
            Self::RestoreState => "restore_state",
            Self::RestoreAntenna => "restore_antenna",
            Self::Done => "done",
            Self::Cleanup => "cleanup",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// A failure in this phase may have happened with the carrier up.
    pub fn transmitter_may_be_keyed(self) -> bool {
        matches!(
            self,
            Self::KeyUp
                | Self::TriggerTuner
                | Self::Settle
                | Self::PollCompletion
                | Self::ReadSwr
                | Self::KeyDown
        )
    }
}

impl fmt::Display for TunePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the phase of one tune sequence.
#[derive(Debug, Clone)]
pub struct TuneMachine {
    phase: TunePhase,
    failed_in: Option<TunePhase>,
    transition_count: u64,
    last_transition: Option<Instant>,
}

impl Default for TuneMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TuneMachine {
    pub fn new() -> Self {
        Self {
            phase: TunePhase::Idle,
            failed_in: None,
            transition_count: 0,
            last_transition: None,
        }
    }

    pub fn phase(&self) -> TunePhase {
        self.phase
    }

    /// Phase the sequence was in when it failed.
    pub fn failed_in(&self) -> Option<TunePhase> {
        self.failed_in
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Time since the last phase change, `None` before the first one.
    pub fn time_in_phase(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Move forward to `next`. Returns false (and stays put) for any move
    /// backwards, sideways or out of cleanup.
    pub fn advance(&mut self, next: TunePhase) -> bool {
        match (self.phase.step(), next.step()) {
            (Some(current), Some(target)) if target > current => {
                self.enter(next);
                true
            }
            _ => false,
        }
    }

    /// Leave the forward path for cleanup. Returns the phase that failed.
    pub fn fail(&mut self) -> TunePhase {
        let failed_in = match self.phase {
            TunePhase::Cleanup | TunePhase::Failed => self.failed_in.unwrap_or(self.phase),
            phase => phase,
        };
        self.failed_in = Some(failed_in);
        if self.phase != TunePhase::Cleanup && self.phase != TunePhase::Failed {
            self.enter(TunePhase::Cleanup);
        }
        failed_in
    }

    /// Cleanup finished.
    pub fn finish_failure(&mut self) -> bool {
        if self.phase == TunePhase::Cleanup {
            self.enter(TunePhase::Failed);
            true
        } else {
            false
        }
    }

    fn enter(&mut self, phase: TunePhase) {
        self.phase = phase;
        self.transition_count += 1;
        self.last_transition = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_only_moves_ahead() {
        let mut machine = TuneMachine::new();
        assert!(machine.advance(TunePhase::SwitchingAntenna));
        assert!(machine.advance(TunePhase::Snapshot));
        assert!(!machine.advance(TunePhase::SwitchingAntenna));
        assert!(!machine.advance(TunePhase::Snapshot));
        // skipping optional phases is allowed
        assert!(machine.advance(TunePhase::KeyDown));
        assert!(machine.advance(TunePhase::Done));
        assert_eq!(machine.transition_count(), 4);
        assert!(machine.phase().is_terminal());
    }

    #[test]
    fn failure_goes_through_cleanup() {
        let mut machine = TuneMachine::new();
        machine.advance(TunePhase::KeyUp);
        machine.advance(TunePhase::TriggerTuner);
        assert_eq!(machine.fail(), TunePhase::TriggerTuner);
        assert_eq!(machine.phase(), TunePhase::Cleanup);
        assert!(!machine.advance(TunePhase::Done));
        // a second failure during cleanup keeps the original phase
        assert_eq!(machine.fail(), TunePhase::TriggerTuner);
        assert!(machine.finish_failure());
        assert_eq!(machine.phase(), TunePhase::Failed);
        assert_eq!(machine.failed_in(), Some(TunePhase::TriggerTuner));
        assert!(!machine.finish_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn time_in_phase_restarts_on_each_move() {
        let mut machine = TuneMachine::new();
        assert_eq!(machine.time_in_phase(), None);
        machine.advance(TunePhase::KeyUp);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let waited = machine.time_in_phase().unwrap();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2100));
        machine.advance(TunePhase::TriggerTuner);
        assert!(machine.time_in_phase().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn keyed_phases() {
        assert!(!TunePhase::Snapshot.transmitter_may_be_keyed());
        assert!(TunePhase::KeyUp.transmitter_may_be_keyed());
        assert!(TunePhase::PollCompletion.transmitter_may_be_keyed());
        assert!(!TunePhase::RestoreState.transmitter_may_be_keyed());
    }

    #[test]
    fn phase_names_match_serde() {
        for phase in [
            TunePhase::Idle,
            TunePhase::SwitchingAntenna,
            TunePhase::SetTunePower,
            TunePhase::ReadSwr,
            TunePhase::RestoreAntenna,
            TunePhase::Failed,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }
}

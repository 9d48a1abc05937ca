// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod machine;
pub mod orchestrator;
pub mod outcome;
pub mod policies;


pub use machine::{TuneMachine, TunePhase};
pub use orchestrator::{TuneOrchestrator, TuneResult};
pub use outcome::{
    CleanupAction, CleanupReport, CleanupStep, TuneAdvisory, TuneError, TuneFailure, TuneOutcome,
};
pub use policies::{AntennaPolicy, CompletionPolling, SettleDelays, TuneProfile};

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod antenna;
pub mod radio;
pub mod rig;
pub mod tune;
pub mod tuner;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use antenna::{AntennaCoordinator, AntennaError, AntennaId, AntennaState, AntennaSwitch};
pub use radio::freq::Freq;
pub use rig::command::RigCommand;
pub use rig::link::{LinkStatus, RigLink, RigLinkConfig, RigSession};
pub use rig::response::{RigError, RigResult};
pub use rig::state::{RigSnapshot, RigTelemetry};
pub use rig::RigControl;
pub use tune::{TuneError, TuneFailure, TuneOrchestrator, TuneOutcome, TunePhase};
pub use tuner::{ProcessTuner, TunerCommand, TunerError, TunerInvoker};

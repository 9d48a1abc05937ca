// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Antenna tune sequence.
//!
//! Moves the antenna relay to the tuning antenna, keys a low-power carrier,
//! lets the tuner find a match and puts everything back. Any failure runs a
//! best-effort cleanup that always unkeys first.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::antenna::{AntennaId, AntennaSwitch};
use crate::rig::command::SWR;
use crate::rig::link::RigLink;
use crate::rig::response::RigError;
use crate::rig::state::RigSnapshot;
use crate::rig::RigControl;
use crate::tune::machine::{TuneMachine, TunePhase};
use crate::tune::outcome::{
    CleanupAction, CleanupReport, TuneAdvisory, TuneError, TuneFailure, TuneOutcome,
};
use crate::tune::policies::{AntennaPolicy, TuneProfile};
use crate::tuner::{parse_tuning, TunerCommand, TunerInvoker};

pub type TuneResult = Result<TuneOutcome, TuneFailure>;

/// Runs tune sequences, one at a time.
pub struct TuneOrchestrator<A, T> {
    antenna: A,
    tuner: T,
    profile: TuneProfile,
    running: AtomicBool,
    phase: watch::Sender<TunePhase>,
}

/// Clears the running flag when a sequence ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the forward path has done so far. Cleanup works from this.
#[derive(Default)]
struct Progress {
    snapshot: Option<RigSnapshot>,
    /// Antenna to go back to, set once a select request was accepted.
    return_to: Option<AntennaId>,
    antenna_switched: bool,
}

impl<A, T> TuneOrchestrator<A, T>
where
    A: AntennaSwitch,
    T: TunerInvoker,
{
    pub fn new(antenna: A, tuner: T, profile: TuneProfile) -> Self {
        let (phase, _) = watch::channel(TunePhase::Idle);
        Self {
            antenna,
            tuner,
            profile,
            running: AtomicBool::new(false),
            phase,
        }
    }

    pub fn antenna(&self) -> &A {
        &self.antenna
    }

    pub fn tuner(&self) -> &T {
        &self.tuner
    }

    pub fn profile(&self) -> &TuneProfile {
        &self.profile
    }

    /// Phase of the current or most recent sequence.
    pub fn phase(&self) -> TunePhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<TunePhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a sequence over `link`, holding it exclusively for the duration.
    ///
    /// A link that is not up fails in phase `idle`, before the antenna or the
    /// rig is touched.
    pub async fn run(&self, link: &RigLink, cancel: &CancellationToken) -> TuneResult {
        let _guard = self.begin()?;
        if !link.is_up() {
            warn!("Tune refused: rig link is {:?}", link.status());
            return Err(TuneFailure::before_start(RigError::LinkDown.into()));
        }
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TuneFailure::before_start(TuneError::Cancelled));
            }
            session = link.session() => session,
        };
        self.sequence(&mut session, cancel).await
    }

    /// Run a sequence on an already exclusive rig handle.
    pub async fn run_with<R>(&self, rig: &mut R, cancel: &CancellationToken) -> TuneResult
    where
        R: RigControl + ?Sized,
    {
        let _guard = self.begin()?;
        self.sequence(rig, cancel).await
    }

    fn begin(&self) -> Result<RunningGuard<'_>, TuneFailure> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("Tune refused: another sequence is running");
                TuneFailure::before_start(TuneError::Busy)
            })?;
        Ok(RunningGuard(&self.running))
    }

    async fn sequence<R>(&self, rig: &mut R, cancel: &CancellationToken) -> TuneResult
    where
        R: RigControl + ?Sized,
    {
        let mut machine = TuneMachine::new();
        self.phase.send_replace(TunePhase::Idle);
        let mut progress = Progress::default();
        info!(
            "Tune sequence started (antenna {}, {} at {:.0}%)",
            self.profile.tuning_antenna,
            self.profile.mode,
            self.profile.power * 100.0
        );

        match self
            .forward(rig, cancel, &mut machine, &mut progress)
            .await
        {
            Ok(outcome) => {
                self.enter(&mut machine, TunePhase::Done);
                debug!("Tune sequence done after {} transitions", machine.transition_count());
                info!("{}", outcome.message());
                Ok(outcome)
            }
            Err(err) => {
                let time_in_phase = machine.time_in_phase();
                let phase = machine.fail();
                self.phase.send_replace(TunePhase::Cleanup);
                error!(
                    "Tune sequence failed in {} after {:?}: {}",
                    phase,
                    time_in_phase.unwrap_or_default(),
                    err
                );
                let cleanup = self.cleanup(rig, &progress).await;
                machine.finish_failure();
                self.phase.send_replace(TunePhase::Failed);
                Err(TuneFailure {
                    error: err,
                    phase,
                    time_in_phase,
                    cleanup_attempted: true,
                    cleanup,
                })
            }
        }
    }

    fn enter(&self, machine: &mut TuneMachine, phase: TunePhase) {
        if machine.advance(phase) {
            debug!("Tune phase -> {}", phase);
            self.phase.send_replace(phase);
        }
    }

    async fn forward<R>(
        &self,
        rig: &mut R,
        cancel: &CancellationToken,
        machine: &mut TuneMachine,
        progress: &mut Progress,
    ) -> Result<TuneOutcome, TuneError>
    where
        R: RigControl + ?Sized,
    {
        let profile = &self.profile;
        let delays = &profile.delays;

        self.enter(machine, TunePhase::SwitchingAntenna);
        self.switch_to_tuning_antenna(cancel, progress).await?;

        self.enter(machine, TunePhase::Snapshot);
        let mode = cancellable(cancel, rig.get_mode()).await??;
        let power = cancellable(cancel, rig.get_power()).await??;
        let freq = if profile.restore_frequency {
            Some(cancellable(cancel, rig.get_freq()).await??)
        } else {
            None
        };
        debug!("Snapshot: mode={} power={} freq={:?}", mode, power, freq);
        let snapshot = RigSnapshot { mode, power, freq };
        progress.snapshot = Some(snapshot.clone());

        self.enter(machine, TunePhase::SetTunePower);
        cancellable(cancel, rig.set_power(profile.power)).await??;
        pause(cancel, delays.after_power).await?;

        self.enter(machine, TunePhase::SetTuneMode);
        cancellable(cancel, rig.set_mode(profile.mode.clone(), profile.passband)).await??;
        pause(cancel, delays.after_mode).await?;

        self.enter(machine, TunePhase::KeyUp);
        cancellable(cancel, rig.set_ptt(true)).await??;
        pause(cancel, delays.after_key_up).await?;

        self.enter(machine, TunePhase::TriggerTuner);
        cancellable(cancel, self.tuner.invoke(TunerCommand::Tune)).await??;

        self.enter(machine, TunePhase::Settle);
        pause(cancel, delays.after_trigger).await?;

        self.enter(machine, TunePhase::PollCompletion);
        let tuned = self.poll_completion(cancel).await?;
        let advisory = (!tuned).then_some(TuneAdvisory::TimedOut {
            polls: profile.polling.max_polls,
        });
        if let Some(advisory) = &advisory {
            warn!(
                "Tuner did not report completion within {:?}: {}",
                profile.polling.budget(),
                advisory
            );
        }

        let swr = if profile.read_swr {
            self.enter(machine, TunePhase::ReadSwr);
            match cancellable(cancel, rig.get_level(SWR)).await? {
                Ok(swr) => Some(swr),
                Err(e) => {
                    warn!("SWR readout failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        // From here on the sequence runs to completion regardless of `cancel`.
        self.enter(machine, TunePhase::KeyDown);
        rig.set_ptt(false).await?;
        time::sleep(delays.after_key_down).await;

        self.enter(machine, TunePhase::RestoreState);
        rig.set_mode(snapshot.mode.clone(), 0).await?;
        time::sleep(delays.after_mode_restore).await;
        rig.set_power(snapshot.power).await?;
        if let Some(freq) = snapshot.freq {
            info!("Restoring frequency {:.6} MHz", freq.mhz());
            rig.set_freq(freq).await?;
        }

        self.enter(machine, TunePhase::RestoreAntenna);
        let antenna_restored = match progress.return_to.clone() {
            Some(original) => {
                let restored = async {
                    self.antenna.select(original.clone()).await?;
                    self.antenna
                        .wait_for_confirmation(original.clone(), profile.confirm_attempts)
                        .await
                }
                .await;
                match (restored, profile.antenna_policy) {
                    (Ok(true), _) => true,
                    (Ok(false), _) => {
                        warn!("Antenna {} not confirmed after restore", original);
                        false
                    }
                    (Err(e), AntennaPolicy::Proceed) => {
                        warn!("Antenna restore to {} failed, proceeding: {}", original, e);
                        false
                    }
                    (Err(e), AntennaPolicy::Abort) => return Err(e.into()),
                }
            }
            None => false,
        };

        Ok(TuneOutcome {
            tuned,
            swr,
            antenna_switched: progress.antenna_switched,
            antenna_restored,
            advisory,
            snapshot,
        })
    }

    async fn switch_to_tuning_antenna(
        &self,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), TuneError> {
        let target = self.profile.tuning_antenna.clone();

        let current = match cancellable(cancel, self.antenna.status()).await? {
            Ok(state) => state.selected,
            Err(e) => return self.antenna_fallback(e.into()),
        };
        if current == target {
            debug!("Already on tuning antenna {}", target);
            return Ok(());
        }

        info!("Switching antenna {} -> {}", current, target);
        if let Err(e) = cancellable(cancel, self.antenna.select(target.clone())).await? {
            return self.antenna_fallback(e.into());
        }
        // The station accepted the request, so the relay may have moved.
        progress.return_to = Some(current);
        let confirmed = cancellable(
            cancel,
            self.antenna
                .wait_for_confirmation(target.clone(), self.profile.confirm_attempts),
        )
        .await?;
        match confirmed {
            Ok(true) => {
                progress.antenna_switched = true;
                Ok(())
            }
            Ok(false) => self.antenna_fallback(TuneError::AntennaNotConfirmed(target)),
            Err(e) => self.antenna_fallback(e.into()),
        }
    }

    fn antenna_fallback(&self, err: TuneError) -> Result<(), TuneError> {
        match self.profile.antenna_policy {
            AntennaPolicy::Abort => Err(err),
            AntennaPolicy::Proceed => {
                warn!("Proceeding without antenna switch: {}", err);
                Ok(())
            }
        }
    }

    /// Poll the tuner until it stops reporting a tune in progress. Returns
    /// false when the polling bound runs out.
    async fn poll_completion(&self, cancel: &CancellationToken) -> Result<bool, TuneError> {
        let polling = self.profile.polling;
        for poll in 1..=polling.max_polls {
            match cancellable(cancel, self.tuner.invoke(TunerCommand::Status)).await? {
                Ok(output) => match parse_tuning(&output) {
                    Some(false) => {
                        debug!("Tuner finished after {} poll(s)", poll);
                        return Ok(true);
                    }
                    Some(true) => {}
                    None => debug!("Empty tuner status on poll {}", poll),
                },
                Err(e) => debug!("Tuner status poll {} failed: {}", poll, e),
            }
            if poll < polling.max_polls {
                pause(cancel, polling.interval).await?;
            }
        }
        Ok(false)
    }

    /// Undo whatever the forward path may have changed. Never stops early.
    async fn cleanup<R>(&self, rig: &mut R, progress: &Progress) -> CleanupReport
    where
        R: RigControl + ?Sized,
    {
        let mut report = CleanupReport::default();

        let result = rig.set_ptt(false).await;
        log_cleanup(CleanupAction::KeyDown, &result);
        report.record(CleanupAction::KeyDown, result);

        if let Some(snapshot) = &progress.snapshot {
            let result = rig.set_mode(snapshot.mode.clone(), 0).await;
            log_cleanup(CleanupAction::RestoreMode, &result);
            report.record(CleanupAction::RestoreMode, result);
            time::sleep(self.profile.delays.after_mode_restore).await;

            let result = rig.set_power(snapshot.power).await;
            log_cleanup(CleanupAction::RestorePower, &result);
            report.record(CleanupAction::RestorePower, result);

            if let Some(freq) = snapshot.freq {
                let result = rig.set_freq(freq).await;
                log_cleanup(CleanupAction::RestoreFrequency, &result);
                report.record(CleanupAction::RestoreFrequency, result);
            }
        }

        if let Some(original) = &progress.return_to {
            let result = self.restore_antenna(original).await;
            log_cleanup(CleanupAction::RestoreAntenna, &result);
            report.record(CleanupAction::RestoreAntenna, result);
        }

        report
    }

    async fn restore_antenna(&self, original: &AntennaId) -> Result<(), String> {
        self.antenna
            .select(original.clone())
            .await
            .map_err(|e| e.to_string())?;
        let confirmed = self
            .antenna
            .wait_for_confirmation(original.clone(), self.profile.cleanup_confirm_attempts)
            .await
            .map_err(|e| e.to_string())?;
        if confirmed {
            Ok(())
        } else {
            Err(format!("antenna {original} not confirmed"))
        }
    }
}

fn log_cleanup<E: std::fmt::Display>(action: CleanupAction, result: &Result<(), E>) {
    match result {
        Ok(()) => info!("Cleanup {:?}: ok", action),
        Err(e) => error!("Cleanup {:?} failed: {}", action, e),
    }
}

/// Race `fut` against cancellation.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, TuneError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TuneError::Cancelled),
        output = fut => Ok(output),
    }
}

async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), TuneError> {
    cancellable(cancel, time::sleep(delay)).await
}

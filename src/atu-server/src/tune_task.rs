// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Runs tune sequences on the main runtime on behalf of HTTP requests.
//!
//! Each request gets its own task so a client that disconnects mid-sequence
//! cannot abort it. Concurrent requests are rejected by the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atu_core::tune::TuneResult;
use atu_core::{AntennaSwitch, RigLink, TuneError, TuneFailure, TuneOrchestrator, TunerInvoker};

pub type Orchestrator = TuneOrchestrator<Arc<dyn AntennaSwitch>, Arc<dyn TunerInvoker>>;

pub struct TuneRequest {
    pub respond_to: oneshot::Sender<TuneResult>,
}

pub async fn run_tune_task(
    orchestrator: Arc<Orchestrator>,
    link: RigLink,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<TuneRequest>,
) {
    while let Some(request) = rx.recv().await {
        if cancel.is_cancelled() {
            let _ = request
                .respond_to
                .send(Err(TuneFailure::before_start(TuneError::Cancelled)));
            continue;
        }
        let orchestrator = orchestrator.clone();
        let link = link.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = orchestrator.run(&link, &cancel).await;
            if request.respond_to.send(result).is_err() {
                debug!("Tune requester went away before the result was ready");
            }
        });
    }
    debug!("Tune task stopped");
}

/// Wait until no sequence is running. Returns false if `limit` passes first.
pub async fn wait_until_idle(orchestrator: &Orchestrator, limit: Duration) -> bool {
    if !orchestrator.is_running() {
        return true;
    }
    info!("Waiting for the running tune sequence to clean up");
    let deadline = Instant::now() + limit;
    while orchestrator.is_running() {
        if Instant::now() >= deadline {
            warn!("Tune sequence still running after {:?}", limit);
            return false;
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use atu_core::antenna::{AntennaError, AntennaFuture};
    use atu_core::tune::TuneProfile;
    use atu_core::tuner::TunerFuture;
    use atu_core::{AntennaId, AntennaState, RigError, RigLinkConfig, TunerCommand};
    use tokio::sync::watch;

    struct NoAntenna;

    impl AntennaSwitch for NoAntenna {
        fn status(&self) -> AntennaFuture<'_, AntennaState> {
            Box::pin(std::future::ready(Err(AntennaError::Unreachable(
                "not wired".into(),
            ))))
        }

        fn select(&self, _id: AntennaId) -> AntennaFuture<'_, ()> {
            Box::pin(std::future::ready(Ok(())))
        }
    }

    struct NoTuner;

    impl TunerInvoker for NoTuner {
        fn invoke(&self, _command: TunerCommand) -> TunerFuture<'_, String> {
            Box::pin(std::future::ready(Ok(String::new())))
        }
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let antenna: Arc<dyn AntennaSwitch> = Arc::new(NoAntenna);
        let tuner: Arc<dyn TunerInvoker> = Arc::new(NoTuner);
        Arc::new(TuneOrchestrator::new(antenna, tuner, TuneProfile::default()))
    }

    fn unreachable_link() -> (RigLink, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Port 9 (discard) on loopback is not expected to run rigctld.
        let (link, _task) = RigLink::spawn_tcp(
            atu_core::rig::endpoint::RigEndpoint::new("127.0.0.1", 9),
            RigLinkConfig::default(),
            shutdown_rx,
        );
        (link, shutdown_tx)
    }

    #[tokio::test]
    async fn answers_each_request() {
        let (link, _shutdown) = unreachable_link();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_tune_task(
            orchestrator(),
            link,
            CancellationToken::new(),
            rx,
        ));

        let (respond_to, response) = oneshot::channel();
        tx.send(TuneRequest { respond_to }).await.unwrap();
        let failure = response.await.unwrap().unwrap_err();
        assert_eq!(failure.error, TuneError::Rig(RigError::LinkDown));
        assert!(!failure.cleanup_attempted);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn refuses_after_cancellation() {
        let (link, _shutdown) = unreachable_link();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::spawn(run_tune_task(orchestrator(), link, cancel, rx));

        let (respond_to, response) = oneshot::channel();
        tx.send(TuneRequest { respond_to }).await.unwrap();
        let failure = response.await.unwrap().unwrap_err();
        assert_eq!(failure.error, TuneError::Cancelled);
    }

    #[tokio::test]
    async fn idle_orchestrator_needs_no_wait() {
        assert!(wait_until_idle(&orchestrator(), Duration::from_millis(1)).await);
    }
}

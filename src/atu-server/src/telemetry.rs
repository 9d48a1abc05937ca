// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic rig status polling for the HTTP status endpoints.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use atu_core::{RigControl, RigError, RigLink, RigResult, RigTelemetry};

/// Read frequency, mode, power and PTT in one go.
pub async fn poll_once<R>(rig: &mut R) -> RigResult<RigTelemetry>
where
    R: RigControl + ?Sized,
{
    let freq = rig.get_freq().await?;
    let mode = rig.get_mode().await?;
    let power = rig.get_power().await?;
    let tx = rig.get_ptt().await?;
    Ok(RigTelemetry {
        freq,
        mode,
        power_percent: RigTelemetry::power_percent_from_fraction(power),
        tx,
        updated_at_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0),
    })
}

/// Poll the rig every `interval` and publish the result.
///
/// A tick is skipped while the link is down or held by someone else, so a
/// running tune sequence is never interleaved with status reads.
pub async fn run_telemetry(
    link: RigLink,
    interval: Duration,
    telemetry_tx: watch::Sender<Option<RigTelemetry>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Telemetry polling every {:?}", interval);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !link.is_up() {
                    continue;
                }
                let mut session = match link.try_session() {
                    Ok(session) => session,
                    Err(RigError::Busy) => {
                        debug!("Telemetry tick skipped: link busy");
                        continue;
                    }
                    Err(e) => {
                        debug!("Telemetry tick skipped: {}", e);
                        continue;
                    }
                };
                match poll_once(&mut session).await {
                    Ok(telemetry) => {
                        telemetry_tx.send_replace(Some(telemetry));
                    }
                    Err(e) if e.is_transient() => debug!("Telemetry poll failed: {}", e),
                    Err(e) => warn!("Telemetry poll failed: {}", e),
                }
            }
        }
    }
    debug!("Telemetry task stopped");
}

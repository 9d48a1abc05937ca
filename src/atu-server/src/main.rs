// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod server;
mod telemetry;
mod tune_task;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use atu_app::{init_logging, ConfigOrigin};
use atu_core::rig::endpoint::RigEndpoint;
use atu_core::{
    AntennaCoordinator, AntennaSwitch, DynResult, ProcessTuner, RigLink, TuneOrchestrator,
    TunerInvoker,
};

use config::ServerConfig;
use server::AppState;
use tune_task::{Orchestrator, TuneRequest};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - antenna tuner coordinator");
const TUNE_REQUEST_BUFFER: usize = 4;
/// Upper bound for a running sequence to finish its cleanup on shutdown.
const CLEANUP_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// rigctld address (<host>:<port>)
    #[arg(short = 'r', long = "rig", value_parser = RigEndpoint::parse)]
    rig: Option<RigEndpoint>,
    /// Base URL of the station control service
    #[arg(short = 's', long = "station-url")]
    station_url: Option<String>,
    /// IP address for the HTTP API
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the HTTP API
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

/// Fold command line overrides into the loaded configuration.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(ref endpoint) = cli.rig {
        cfg.rig.host = endpoint.host.clone();
        cfg.rig.port = endpoint.port;
    }
    if let Some(ref url) = cli.station_url {
        cfg.antenna.base_url = url.clone();
    }
    if let Some(listen) = cli.listen {
        cfg.listen.listen = listen;
    }
    if let Some(port) = cli.port {
        cfg.listen.port = port;
    }
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, origin) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, ConfigOrigin::File(path.clone()))
    } else {
        let loaded = ServerConfig::load_from_default_paths()?;
        (loaded.config, loaded.origin)
    };
    apply_cli(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    match origin {
        ConfigOrigin::File(path) => info!("Loaded configuration from {}", path.display()),
        ConfigOrigin::Defaults { skipped } => {
            for path in &skipped {
                warn!(
                    "Ignoring {}: no [{}] section",
                    path.display(),
                    config::SECTION
                );
            }
            info!("No configuration file found, using defaults");
        }
    }

    let endpoint = cfg.rig_endpoint();
    info!(
        "Starting atu-server (rig: {}, station: {}, tuner: {})",
        endpoint,
        cfg.antenna.base_url,
        cfg.tuner.program.display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    let (link, link_task) = RigLink::spawn_tcp(endpoint, cfg.link_config(), shutdown_rx.clone());
    task_handles.push(link_task);

    let antenna: Arc<dyn AntennaSwitch> = Arc::new(
        AntennaCoordinator::new(
            cfg.antenna.base_url.trim(),
            Duration::from_millis(cfg.antenna.request_timeout_ms),
        )?
        .with_confirm_interval(Duration::from_millis(cfg.antenna.confirm_interval_ms)),
    );
    let tuner: Arc<dyn TunerInvoker> = Arc::new(
        ProcessTuner::new(cfg.tuner.program.clone())
            .with_args(cfg.tuner.args.clone())
            .with_timeout(Duration::from_millis(cfg.tuner.invoke_timeout_ms)),
    );
    let orchestrator: Arc<Orchestrator> =
        Arc::new(TuneOrchestrator::new(antenna, tuner, cfg.tune_profile()));

    let cancel = CancellationToken::new();
    let (tune_tx, tune_rx) = mpsc::channel::<TuneRequest>(TUNE_REQUEST_BUFFER);
    task_handles.push(tokio::spawn(tune_task::run_tune_task(
        orchestrator.clone(),
        link.clone(),
        cancel.clone(),
        tune_rx,
    )));

    let (telemetry_tx, telemetry_rx) = watch::channel(None);
    if cfg.telemetry.enabled {
        task_handles.push(tokio::spawn(telemetry::run_telemetry(
            link.clone(),
            Duration::from_millis(cfg.telemetry.interval_ms),
            telemetry_tx,
            shutdown_rx.clone(),
        )));
    } else {
        info!("Telemetry polling disabled");
    }

    if cfg.listen.enabled {
        let addr = SocketAddr::from((cfg.listen.listen, cfg.listen.port));
        let state = AppState {
            link: link.clone(),
            orchestrator: orchestrator.clone(),
            tune_tx,
            telemetry: telemetry_rx,
            display: cfg.tuner.display_convention,
        };
        let server_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = server::serve(addr, state, server_shutdown_rx).await {
                error!("HTTP API error: {:?}", e);
            }
        }));
    } else {
        warn!("HTTP API disabled; tune sequences cannot be requested");
        drop(tune_tx);
    }

    let signal_shutdown_rx = shutdown_rx.clone();
    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Ctrl+C received, shutting down");
        }
        _ = wait_for_shutdown(signal_shutdown_rx) => {}
    }

    cancel.cancel();
    tune_task::wait_until_idle(&orchestrator, CLEANUP_WAIT).await;
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_millis(400)).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "atu-server",
            "--rig",
            "10.0.0.5:4533",
            "--station-url",
            "http://shack.lan",
            "-p",
            "8080",
        ]);
        let mut cfg = ServerConfig::default();
        apply_cli(&cli, &mut cfg);
        assert_eq!(cfg.rig.host, "10.0.0.5");
        assert_eq!(cfg.rig.port, 4533);
        assert_eq!(cfg.antenna.base_url, "http://shack.lan");
        assert_eq!(cfg.listen.port, 8080);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_rig_address_is_rejected() {
        assert!(Cli::try_parse_from(["atu-server", "--rig", "rig:0"]).is_err());
    }
}

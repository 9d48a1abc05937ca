// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

#[path = "api.rs"]
mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use tokio::sync::{mpsc, watch};
use tracing::info;

use atu_core::tuner::DisplayConvention;
use atu_core::{RigLink, RigTelemetry};

use crate::tune_task::{Orchestrator, TuneRequest};

/// Everything the HTTP handlers reach.
pub struct AppState {
    pub link: RigLink,
    pub orchestrator: Arc<Orchestrator>,
    pub tune_tx: mpsc::Sender<TuneRequest>,
    pub telemetry: watch::Receiver<Option<RigTelemetry>>,
    pub display: DisplayConvention,
}

pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let server = build_server(addr, state)?;
    let handle = server.handle();
    tokio::spawn(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
        handle.stop(true).await;
    });
    info!("http api listening on {}", addr);
    server.await
}

fn build_server(addr: SocketAddr, state: AppState) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::configure)
    })
    .shutdown_timeout(1)
    .disable_signals()
    .bind(addr)?
    .run();
    Ok(server)
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use actix_web::http::StatusCode;
use actix_web::{get, post, web, Error, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use atu_core::tune::{CleanupReport, TuneAdvisory, TuneFailure, TuneOutcome};
use atu_core::tuner::{full_status, parse_tuning};
use atu_core::{
    AntennaSwitch, Freq, RigControl, RigError, TuneError, TunePhase, TunerCommand, TunerInvoker,
};

use super::AppState;
use crate::tune_task::TuneRequest;

fn rig_error(err: RigError) -> HttpResponse {
    let status = match err {
        RigError::Busy => StatusCode::CONFLICT,
        RigError::LinkDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(json!({
        "error": err.to_string(),
        "kind": err.code(),
    }))
}

fn ok() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ok": true }))
}

#[get("/api/frequency")]
pub async fn get_frequency(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.get_freq().await {
        Ok(freq) => HttpResponse::Ok().json(json!({ "frequency": freq.hz })),
        Err(e) => rig_error(e),
    }
}

#[derive(Deserialize)]
pub struct FrequencyBody {
    pub frequency: Value,
}

/// Accept the frequency as a JSON number or a numeric string.
fn freq_from_json(value: &Value) -> Option<Freq> {
    match value {
        Value::Number(n) => n.as_u64().map(Freq::new).or_else(|| {
            n.as_f64()
                .and_then(|hz| Freq::parse_hz(&hz.to_string()))
        }),
        Value::String(s) => Freq::parse_hz(s),
        _ => None,
    }
}

#[post("/api/frequency")]
pub async fn set_frequency(
    body: web::Json<FrequencyBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let freq = freq_from_json(&body.frequency).ok_or_else(|| {
        actix_web::error::ErrorBadRequest(format!("invalid frequency: {}", body.frequency))
    })?;
    let mut link = state.link.clone();
    Ok(match link.set_freq(freq).await {
        Ok(()) => ok(),
        Err(e) => rig_error(e),
    })
}

#[get("/api/mode")]
pub async fn get_mode(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.get_mode().await {
        Ok(mode) => HttpResponse::Ok().json(json!({ "mode": mode })),
        Err(e) => rig_error(e),
    }
}

#[get("/api/power")]
pub async fn get_power(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.get_power().await {
        Ok(power) => HttpResponse::Ok().json(json!({
            "power": atu_core::RigTelemetry::power_percent_from_fraction(power)
        })),
        Err(e) => rig_error(e),
    }
}

#[derive(Deserialize)]
pub struct PowerBody {
    /// Percent of full output.
    pub power: f32,
}

#[post("/api/power")]
pub async fn set_power(
    body: web::Json<PowerBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    if !(0.0..=100.0).contains(&body.power) {
        return Err(actix_web::error::ErrorBadRequest(format!(
            "power must be in range 0..=100, got {}",
            body.power
        )));
    }
    let mut link = state.link.clone();
    Ok(match link.set_power(body.power / 100.0).await {
        Ok(()) => ok(),
        Err(e) => rig_error(e),
    })
}

#[post("/api/tx")]
pub async fn key_up(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.set_ptt(true).await {
        Ok(()) => ok(),
        Err(e) => rig_error(e),
    }
}

#[post("/api/rx")]
pub async fn key_down(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.set_ptt(false).await {
        Ok(()) => ok(),
        Err(e) => rig_error(e),
    }
}

#[get("/api/tx-status")]
pub async fn tx_status(state: web::Data<AppState>) -> HttpResponse {
    let mut link = state.link.clone();
    match link.get_ptt().await {
        Ok(tx) => HttpResponse::Ok().json(json!({ "status": if tx { "TX" } else { "RX" } })),
        Err(e) => rig_error(e),
    }
}

#[post("/api/atu/{command}")]
pub async fn atu_command(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let command = path
        .parse::<TunerCommand>()
        .map_err(actix_web::error::ErrorBadRequest)?;
    if matches!(command, TunerCommand::Status | TunerCommand::State) {
        return Err(actix_web::error::ErrorBadRequest(format!(
            "'{command}' is a query, use GET /api/atu/status or /api/atu/fullstatus"
        )));
    }
    // A mode change or reset would end the completion poll of a running tune.
    if state.orchestrator.is_running() {
        return Ok(HttpResponse::Conflict().json(json!({
            "error": format!("tune sequence in {}", state.orchestrator.phase()),
            "kind": "busy",
        })));
    }
    Ok(match state.orchestrator.tuner().invoke(command).await {
        Ok(output) => HttpResponse::Ok().json(json!({ "ok": true, "output": output })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    })
}

#[get("/api/atu/status")]
pub async fn atu_status(state: web::Data<AppState>) -> HttpResponse {
    match state.orchestrator.tuner().invoke(TunerCommand::Status).await {
        Ok(output) => {
            let tuning = parse_tuning(&output).unwrap_or(false);
            HttpResponse::Ok().json(json!({
                "tuning": tuning,
                "status": if tuning { "TUNING" } else { "READY" },
            }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

#[get("/api/atu/fullstatus")]
pub async fn atu_full_status(state: web::Data<AppState>) -> HttpResponse {
    match full_status(state.orchestrator.tuner().as_ref(), state.display).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

#[derive(Serialize)]
struct TuneSuccessBody<'a> {
    ok: bool,
    message: String,
    tuned: bool,
    swr: Option<f32>,
    antenna_switched: bool,
    antenna_restored: bool,
    advisory: Option<&'a TuneAdvisory>,
}

impl<'a> From<&'a TuneOutcome> for TuneSuccessBody<'a> {
    fn from(outcome: &'a TuneOutcome) -> Self {
        Self {
            ok: true,
            message: outcome.message(),
            tuned: outcome.tuned,
            swr: outcome.swr,
            antenna_switched: outcome.antenna_switched,
            antenna_restored: outcome.antenna_restored,
            advisory: outcome.advisory.as_ref(),
        }
    }
}

#[derive(Serialize)]
struct TuneFailureBody<'a> {
    ok: bool,
    error: String,
    kind: &'static str,
    phase: TunePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_in_phase_ms: Option<u64>,
    cleanup_attempted: bool,
    cleanup: &'a CleanupReport,
}

fn tune_failure(failure: &TuneFailure) -> HttpResponse {
    let status = match &failure.error {
        TuneError::Busy | TuneError::Rig(RigError::Busy) => StatusCode::CONFLICT,
        TuneError::Rig(RigError::LinkDown) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(TuneFailureBody {
        ok: false,
        error: failure.error.to_string(),
        kind: failure.error.code(),
        phase: failure.phase,
        time_in_phase_ms: failure
            .time_in_phase
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        cleanup_attempted: failure.cleanup_attempted,
        cleanup: &failure.cleanup,
    })
}

#[post("/api/tune")]
pub async fn tune(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (respond_to, response) = oneshot::channel();
    state
        .tune_tx
        .send(TuneRequest { respond_to })
        .await
        .map_err(|e| {
            actix_web::error::ErrorInternalServerError(format!("tune task unavailable: {e:?}"))
        })?;
    let result = response.await.map_err(|_| {
        actix_web::error::ErrorInternalServerError("tune task dropped the request")
    })?;
    Ok(match result {
        Ok(outcome) => HttpResponse::Ok().json(TuneSuccessBody::from(&outcome)),
        Err(failure) => tune_failure(&failure),
    })
}

#[get("/api/tune/phase")]
pub async fn tune_phase(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "phase": state.orchestrator.phase(),
        "running": state.orchestrator.is_running(),
    }))
}

#[get("/api/antenna/status")]
pub async fn antenna_status(state: web::Data<AppState>) -> HttpResponse {
    match state.orchestrator.antenna().status().await {
        Ok(antenna) => HttpResponse::Ok().json(antenna),
        Err(e) => HttpResponse::BadGateway().json(json!({ "error": e.to_string() })),
    }
}

#[get("/api/telemetry")]
pub async fn telemetry(state: web::Data<AppState>) -> HttpResponse {
    match state.telemetry.borrow().clone() {
        Some(telemetry) => HttpResponse::Ok().json(telemetry),
        None => HttpResponse::ServiceUnavailable().json(json!({
            "error": "no rig telemetry yet",
        })),
    }
}

#[get("/api/link")]
pub async fn link_status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": state.link.status() }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_frequency)
        .service(set_frequency)
        .service(get_mode)
        .service(get_power)
        .service(set_power)
        .service(key_up)
        .service(key_down)
        .service(tx_status)
        .service(atu_status)
        .service(atu_full_status)
        .service(atu_command)
        .service(tune)
        .service(tune_phase)
        .service(antenna_status)
        .service(telemetry)
        .service(link_status);
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atu_core::{AntennaCoordinator, AntennaError, AntennaId, AntennaSwitch};

async fn setup() -> (MockServer, AntennaCoordinator) {
    let server = MockServer::start().await;
    let coordinator = AntennaCoordinator::new(server.uri(), Duration::from_secs(2))
        .unwrap()
        .with_confirm_interval(Duration::from_millis(5));
    (server, coordinator)
}

fn status_body(selected: &str, relay_ok: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "selected": selected,
        "relay_ok": relay_ok,
        "hf_state": "rx",
    }))
}

async fn status_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.url.path() == "/api/antenna/status")
        .count()
}

#[tokio::test]
async fn reads_status() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("SDR", true))
        .mount(&server)
        .await;

    let state = coordinator.status().await.unwrap();
    assert_eq!(state.selected, AntennaId::from("SDR"));
    assert!(state.relay_ok);
}

#[tokio::test]
async fn select_posts_to_antenna_path() {
    let (server, coordinator) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/antenna/590"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    coordinator.select(AntennaId::from("590")).await.unwrap();
}

#[tokio::test]
async fn select_reports_http_failure() {
    let (server, coordinator) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/antenna/590"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = coordinator.select(AntennaId::from("590")).await.unwrap_err();
    assert!(matches!(err, AntennaError::Http { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn confirms_once_relay_settles() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("SDR", true))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("590", false))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("590", true))
        .mount(&server)
        .await;

    let confirmed = coordinator
        .wait_for_confirmation(AntennaId::from("590"), 10)
        .await
        .unwrap();
    assert!(confirmed);
    assert_eq!(status_requests(&server).await, 3);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("SDR", true))
        .mount(&server)
        .await;

    let confirmed = coordinator
        .wait_for_confirmation(AntennaId::from("590"), 4)
        .await
        .unwrap();
    assert!(!confirmed);
    assert_eq!(status_requests(&server).await, 4);
}

#[tokio::test]
async fn early_errors_are_tolerated() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("590", true))
        .mount(&server)
        .await;

    let confirmed = coordinator
        .wait_for_confirmation(AntennaId::from("590"), 3)
        .await
        .unwrap();
    assert!(confirmed);
}

#[tokio::test]
async fn error_on_final_attempt_is_unreachable() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(status_body("SDR", true))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = coordinator
        .wait_for_confirmation(AntennaId::from("590"), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, AntennaError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let coordinator =
        AntennaCoordinator::new(format!("http://127.0.0.1:{port}/"), Duration::from_secs(2))
            .unwrap();
    let err = coordinator.status().await.unwrap_err();
    assert!(matches!(err, AntennaError::Unreachable(_)), "got {err:?}");

    let err = coordinator
        .wait_for_confirmation(AntennaId::from("590"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AntennaError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
async fn undecodable_status_is_reported() {
    let (server, coordinator) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/antenna/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = coordinator.status().await.unwrap_err();
    assert!(matches!(err, AntennaError::InvalidStatus(_)), "got {err:?}");
}

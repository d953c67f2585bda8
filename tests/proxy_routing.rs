//! End-to-end tests for transactional proxying through the gateway.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{
    client, gateway_config, spawn_aborting_backend, spawn_service_backend, spawn_stalling_backend, start_gateway,
};

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn chat_path_is_rewritten_with_query() {
    let chat = spawn_service_backend("chat").await;
    let gateway = start_gateway(gateway_config(&[("chat", chat.base_url())])).await;

    let res = client()
        .get(gateway.url("/api/chat/foo?x=1&room=fantasy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["service"], "chat");
    assert_eq!(body["path"], "/api/messages/foo");
    assert_eq!(body["query"], "x=1&room=fantasy");
    assert_eq!(body["host"], chat.addr.to_string());
    assert_eq!(body["forwardedFor"], "127.0.0.1");
    assert!(body["requestId"].is_string());
    assert_eq!(chat.hits(), 1);
}

#[tokio::test]
async fn body_and_method_are_forwarded() {
    let auth = spawn_service_backend("auth").await;
    let gateway = start_gateway(gateway_config(&[("auth", auth.base_url())])).await;

    let res = client()
        .post(gateway.url("/api/auth/login"))
        .header("content-type", "application/json")
        .body(r#"{"email":"a@b.c"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/api/auth/login");
    assert_eq!(body["body"], r#"{"email":"a@b.c"}"#);
}

#[tokio::test]
async fn unknown_route_lists_prefixes() {
    let gateway = start_gateway(gateway_config(&[])).await;

    let res = client().get(gateway.url("/api/unknown")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ROUTE_NOT_FOUND");
    assert_eq!(body["message"], "The requested endpoint does not exist");
    assert_eq!(body["path"], "/api/unknown");
    assert_eq!(
        body["availableRoutes"],
        serde_json::json!(["/api/auth/*", "/api/books/*", "/api/comments/*", "/api/chat/*"])
    );
}

#[tokio::test]
async fn unhealthy_service_is_never_called() {
    let book = spawn_service_backend("book").await;
    let gateway = start_gateway(gateway_config(&[("book", book.base_url())])).await;

    gateway.registry.record_probe_result("book", false);

    let res = client().get(gateway.url("/api/books/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["message"], "The book service is currently unavailable");
    assert_eq!(book.hits(), 0);

    gateway.registry.record_probe_result("book", true);
    let res = client().get(gateway.url("/api/books/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(book.hits(), 1);
}

#[tokio::test]
async fn dropped_connection_becomes_500_and_gateway_keeps_serving() {
    let aborting = spawn_aborting_backend().await;
    let gateway = start_gateway(gateway_config(&[("comment", format!("http://{aborting}"))])).await;

    let res = client().get(gateway.url("/api/comments/book/3")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "SERVICE_TEMPORARILY_UNAVAILABLE");
    assert_eq!(body["service"], "comment");

    let res = client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn stalled_backend_body_closes_the_connection() {
    let stalling = spawn_stalling_backend().await;
    let mut config = gateway_config(&[("book", format!("http://{stalling}"))]);
    config.timeouts.upstream_secs = 1;
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/api/books/7")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("body read hung on a quiet backend");
    assert!(body.is_err(), "truncated body was reported as complete");

    let res = client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn slow_request_hits_the_overall_deadline() {
    let book = spawn_service_backend("book").await;
    let mut config = gateway_config(&[("book", book.base_url())]);
    config.timeouts.request_secs = 1;
    let gateway = start_gateway(config).await;

    let started = std::time::Instant::now();
    let res = client().get(gateway.url("/api/books?delay_ms=3000")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn fourth_request_in_window_is_limited() {
    let book = spawn_service_backend("book").await;
    let mut config = gateway_config(&[("book", book.base_url())]);
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_ms = 60_000;
    let gateway = start_gateway(config).await;

    let client = client();
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let res = client.get(gateway.url("/api/books")).send().await.unwrap();
        statuses.push(res.status());
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            assert!(res.headers().contains_key("retry-after"));
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["error"], "RATE_LIMIT_EXCEEDED");
        }
    }

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
    assert_eq!(book.hits(), 3);
}

#[tokio::test]
async fn probes_drive_health_gate_and_status() {
    let book = spawn_service_backend("book").await;
    let others: Vec<_> = futures_util::future::join_all(
        ["auth", "comment", "chat"].map(spawn_service_backend),
    )
    .await;

    let mut urls = vec![("book", book.base_url())];
    for (name, service) in ["auth", "comment", "chat"].into_iter().zip(&others) {
        urls.push((name, service.base_url()));
    }
    let mut config = gateway_config(&urls);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    let gateway = start_gateway(config).await;

    book.set_healthy(false);
    let registry = gateway.registry.clone();
    assert!(wait_until(|| !registry.is_healthy("book")).await, "probe never marked book unhealthy");

    let res = client().get(gateway.url("/api/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["overall"], "degraded");
    assert_eq!(status["services"]["book"]["healthy"], false);
    assert!(status["services"]["book"]["lastCheckedAt"].is_string());

    let res = client().get(gateway.url("/api/books")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(book.hits(), 0);

    book.set_healthy(true);
    assert!(wait_until(|| registry.is_healthy("book")).await, "probe never restored book");

    let res = client().get(gateway.url("/api/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client().get(gateway.url("/api/books")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(book.hits(), 1);
}

#[tokio::test]
async fn diagnostics_describe_the_gateway() {
    let gateway = start_gateway(gateway_config(&[])).await;

    let health: Value = client().get(gateway.url("/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "API Gateway is running");
    assert_eq!(health["services"].as_object().unwrap().len(), 4);

    let info: Value = client().get(gateway.url("/api")).send().await.unwrap().json().await.unwrap();
    assert_eq!(info["availableServices"][0], "/api/auth/* - auth service");
}

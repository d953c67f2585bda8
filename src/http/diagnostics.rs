//! Gateway diagnostics endpoints: `/health`, `/api/status` and `/api`.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::ServiceDescriptor;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    /// Service name to base URL.
    pub services: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub overall: &'static str,
    pub services: BTreeMap<String, ServiceDescriptor>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub available_services: Vec<String>,
}

/// Liveness of the gateway itself; always 200.
pub async fn gateway_health(State(state): State<AppState>) -> Json<GatewayHealth> {
    let services = state
        .registry
        .services()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect();

    Json(GatewayHealth {
        status: "API Gateway is running",
        timestamp: Utc::now(),
        services,
    })
}

/// Per-service health; 503 while any service is unhealthy.
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let all_healthy = snapshot.iter().all(|d| d.healthy);

    let body = ServiceStatus {
        overall: if all_healthy { "healthy" } else { "degraded" },
        services: snapshot.into_iter().map(|d| (d.name.clone(), d)).collect(),
        timestamp: Utc::now(),
    };
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub async fn gateway_info(State(state): State<AppState>) -> Json<GatewayInfo> {
    let available_services = state
        .routes
        .rules()
        .map(|rule| format!("{}/* - {} service", rule.path_prefix(), rule.target_service()))
        .collect();

    Json(GatewayInfo {
        message: "BookNest API Gateway",
        version: env!("CARGO_PKG_VERSION"),
        available_services,
    })
}

//! Gateway error kinds and their client-facing responses.
//!
//! Every short-circuit in the request pipeline ends up here. The mapping from
//! kind to status code and body lives in one place so the router, admission
//! middleware and WebSocket proxy all answer clients the same way.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced to clients of the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("The requested endpoint does not exist")]
    RouteNotFound {
        path: String,
        available: Vec<String>,
    },

    #[error("The {service} service is currently unavailable")]
    ServiceUnavailable { service: String },

    #[error("The requested service is currently unavailable. Please try again later.")]
    UpstreamTransport { service: String, reason: String },

    #[error("Too many requests from this IP, please try again later.")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Unable to connect to {service} service")]
    UpgradeEstablishment { service: String, reason: String },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTransport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpgradeEstablishment { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::UpstreamTransport { .. } => "SERVICE_TEMPORARILY_UNAVAILABLE",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::UpgradeEstablishment { .. } => "UPGRADE_ESTABLISHMENT_FAILED",
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        match self {
            GatewayError::RouteNotFound { path, available } => {
                body["path"] = json!(path);
                body["availableRoutes"] = json!(available);
            }
            GatewayError::ServiceUnavailable { service }
            | GatewayError::UpstreamTransport { service, .. } => {
                body["service"] = json!(service);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Tunnel establishment is a connection-level failure, not an API error.
        if let GatewayError::UpgradeEstablishment { .. } = self {
            return (status, self.to_string()).into_response();
        }

        let mut response = (status, Json(self.body())).into_response();
        if let GatewayError::RateLimitExceeded { retry_after } = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

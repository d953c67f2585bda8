//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and every
//! section has defaults matching the stock four-service deployment.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services, one base URL per name.
    pub services: Vec<ServiceConfig>,

    /// Path prefix rules mapping requests to services.
    pub routes: Vec<RouteConfig>,

    /// Persistent-connection (WebSocket) proxying.
    pub upgrade: UpgradeConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cross-origin settings for the browser client.
    pub cors: CorsConfig,

    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            services: vec![
                ServiceConfig::new("auth", "http://localhost:5001"),
                ServiceConfig::new("book", "http://localhost:5002"),
                ServiceConfig::new("comment", "http://localhost:5003"),
                ServiceConfig::new("chat", "http://localhost:5004"),
            ],
            routes: vec![
                RouteConfig::new("/api/auth", "auth", "/api/auth"),
                RouteConfig::new("/api/books", "book", "/api/books"),
                RouteConfig::new("/api/comments", "comment", "/api/comments"),
                RouteConfig::new("/api/chat", "chat", "/api/messages"),
            ],
            upgrade: UpgradeConfig::default(),
            health_check: HealthCheckConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            cors: CorsConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// A backend service registered at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name (used by routes and diagnostics).
    pub name: String,

    /// Base URL, e.g. "http://localhost:5001". No trailing slash needed.
    pub base_url: String,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

/// Route configuration mapping a path prefix to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// External path prefix to match.
    pub path_prefix: String,

    /// Name of the target service.
    pub service: String,

    /// Prefix that replaces `path_prefix` before forwarding.
    /// Defaults to the external prefix (no rewrite).
    #[serde(default)]
    pub rewrite_prefix: Option<String>,
}

impl RouteConfig {
    pub fn new(
        path_prefix: impl Into<String>,
        service: impl Into<String>,
        rewrite_prefix: impl Into<String>,
    ) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            service: service.into(),
            rewrite_prefix: Some(rewrite_prefix.into()),
        }
    }
}

/// Upgrade (WebSocket) proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Enable the upgrade path.
    pub enabled: bool,

    /// Path prefix handled by the tunnel, forwarded without rewriting.
    pub path_prefix: String,

    /// Messaging service that terminates the tunnel.
    pub service: String,

    /// Connect timeout for the backend leg, and request timeout for
    /// non-upgrade (polling) requests on the same prefix.
    pub timeout_secs: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/socket.io".to_string(),
            service: "chat".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    /// 1 flips on the first failed probe.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 1,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per client within one window.
    pub max_requests: u32,

    /// Upper bound on tracked client buckets.
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 15 * 60 * 1000,
            max_requests: 100,
            max_clients: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to start responding, in seconds.
    pub upstream_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 60,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origin of the browser client.
    pub allowed_origin: String,

    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "http://localhost:5173".to_string(),
            allow_credentials: true,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"

            [rate_limit]
            max_requests = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window_ms, 900_000);
        assert_eq!(config.services.len(), 4);
        assert_eq!(config.health_check.interval_secs, 30);
    }

    #[test]
    fn routes_without_rewrite_parse() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[services]]
            name = "chat"
            base_url = "http://chat:5004"

            [[routes]]
            path_prefix = "/api/chat"
            service = "chat"
            "#,
        )
        .unwrap();

        assert_eq!(config.services.len(), 1);
        assert_eq!(config.routes[0].rewrite_prefix, None);
    }
}

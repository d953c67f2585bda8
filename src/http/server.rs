//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the service registry, route table and rate limiter from config
//! - Create the Axum router with diagnostics, upgrade and proxy handlers
//! - Wire up middleware (request ID, tracing, CORS, security headers,
//!   admission, timeout, body limit)
//! - Run the health monitor and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::CorsConfig;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::health::{HealthMonitor, ServiceRegistry};
use crate::http::diagnostics;
use crate::http::proxy::{build_client, proxy_handler, HttpClient};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::http::websocket::upgrade_handler;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::routing::RouteTable;
use crate::security::headers::with_security_headers;
use crate::security::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub routes: Arc<RouteTable>,
    pub client: HttpClient,
    pub upstream_timeout: Duration,
    pub upgrade_service: String,
    pub upgrade_timeout: Duration,
    /// Fires when the server shuts down; open tunnels close on it.
    pub shutdown: ShutdownSignal,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    registry: Arc<ServiceRegistry>,
    limiter: Arc<RateLimiter>,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The configuration is validated here as well as by the loader, so
    /// hand-built configs get the same checks.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let mut registry = ServiceRegistry::new(config.health_check.unhealthy_threshold);
        for service in &config.services {
            registry.register(service.name.as_str(), service.base_url.as_str())?;
        }
        let registry = Arc::new(registry);
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let shutdown = Shutdown::new();

        let state = AppState {
            registry: registry.clone(),
            routes: Arc::new(RouteTable::from_config(&config.routes)),
            client: build_client(Duration::from_secs(config.timeouts.connect_secs)),
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
            upgrade_service: config.upgrade.service.clone(),
            upgrade_timeout: Duration::from_secs(config.upgrade.timeout_secs),
            shutdown: shutdown.subscribe(),
        };

        let router = Self::build_router(&config, state, limiter.clone());
        Ok(Self {
            router,
            config,
            registry,
            limiter,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost first: request ID, trace, CORS, security headers,
    /// admission, timeout, body limit, then the handler. Methods a
    /// diagnostics route does not serve fall through to the proxy.
    fn build_router(config: &GatewayConfig, state: AppState, limiter: Arc<RateLimiter>) -> Router {
        let mut router = Router::new()
            .route("/health", get(diagnostics::gateway_health).fallback(proxy_handler))
            .route("/api/status", get(diagnostics::service_status).fallback(proxy_handler))
            .route("/api", get(diagnostics::gateway_info).fallback(proxy_handler));

        if config.upgrade.enabled {
            let prefix = config.upgrade.path_prefix.trim_end_matches('/');
            router = router
                .route(prefix, any(upgrade_handler))
                .route(&format!("{prefix}/"), any(upgrade_handler))
                .route(&format!("{prefix}/{{*rest}}"), any(upgrade_handler));
        }

        let mut router = router
            .fallback(proxy_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ));

        if config.rate_limit.enabled {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }
        if config.security.enable_headers {
            router = with_security_headers(router);
        }

        router
            .layer(cors_layer(&config.cors))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            rate_limit = self.config.rate_limit.enabled,
            "HTTP server starting"
        );
        for (name, base_url) in self.registry.services() {
            tracing::info!(service = name, base_url = base_url, "Service registered");
        }

        let HttpServer {
            router,
            config,
            registry,
            shutdown: internal,
            ..
        } = self;

        let monitor = HealthMonitor::new(registry, config.health_check);
        tokio::spawn(monitor.run(internal.subscribe()));

        // External shutdown also stops the monitor and every open tunnel.
        let trigger = internal.clone();
        tokio::spawn(async move {
            shutdown.recv().await;
            trigger.trigger();
        });

        let mut server_signal = internal.subscribe();
        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_signal.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request());

    if config.allowed_origin == "*" {
        // Wildcard origins cannot be combined with credentials.
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => layer
            .allow_origin(origin)
            .allow_credentials(config.allow_credentials)
            .expose_headers([X_REQUEST_ID, header::RETRY_AFTER]),
        Err(_) => {
            tracing::warn!(origin = %config.allowed_origin, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}

//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered service
//! - Feed results into the service registry

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use dashmap::DashSet;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::registry::ServiceRegistry;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

type ProbeClient = Client<HttpConnector, Body>;

const USER_AGENT: &str = "api-gateway-health-check";

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    config: HealthCheckConfig,
    client: ProbeClient,
    /// Services with a check still running; their next tick is skipped.
    in_flight: Arc<DashSet<String>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, config: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            registry,
            config,
            client,
            in_flight: Arc::default(),
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            path = %self.config.path,
            services = self.registry.len(),
            "Health monitor starting"
        );

        // First probe one interval after startup; until then services stay
        // optimistically healthy.
        let period = Duration::from_secs(self.config.interval_secs);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Spawn one probe task per service. Probes are not awaited here, so a slow
    /// backend only delays its own status update. A service whose previous
    /// check has not finished is skipped for this tick.
    fn check_all(&self) {
        for (name, base_url) in self.registry.services() {
            let name = name.to_string();
            if !self.in_flight.insert(name.clone()) {
                tracing::debug!(service = %name, "Previous health check still running, skipping tick");
                continue;
            }
            let url = format!("{}{}", base_url, self.config.path);
            let client = self.client.clone();
            let registry = self.registry.clone();
            let timeout = Duration::from_secs(self.config.timeout_secs);
            let in_flight = self.in_flight.clone();

            tokio::spawn(async move {
                let success = probe(&client, &name, &url, timeout).await;
                in_flight.remove(&name);
                let was_healthy = registry.is_healthy(&name);

                if let Some(descriptor) = registry.record_probe_result(&name, success) {
                    if was_healthy && !descriptor.healthy {
                        tracing::warn!(
                            service = %name,
                            failures = descriptor.consecutive_failures,
                            "Service marked unhealthy"
                        );
                    } else if !was_healthy && descriptor.healthy {
                        tracing::info!(service = %name, "Service recovered");
                    }
                    metrics::record_service_health(&name, descriptor.healthy);
                }
            });
        }
    }
}

/// Probe `url` once. Success is a 2xx response within `timeout`.
pub async fn probe(client: &ProbeClient, service: &str, url: &str, timeout: Duration) -> bool {
    let request = match Request::builder()
        .method("GET")
        .uri(url)
        .header(header::USER_AGENT, USER_AGENT)
        .body(Body::empty())
    {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(service = %service, url = %url, error = %e, "Failed to build health check request");
            return false;
        }
    };

    match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let success = response.status().is_success();
            if !success {
                tracing::warn!(service = %service, status = %response.status(), "Health check failed: non-success status");
            }
            success
        }
        Ok(Err(e)) => {
            tracing::warn!(service = %service, error = %e, "Health check failed: connection error");
            false
        }
        Err(_) => {
            tracing::warn!(service = %service, "Health check failed: timeout");
            false
        }
    }
}

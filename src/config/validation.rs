//! Configuration validation.
//!
//! Serde handles syntax; this module checks the semantic rules the gateway relies
//! on at runtime: unique service names, usable base URLs, and routes that only
//! reference registered services. All problems are reported, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// Longest probe timeout the health monitor accepts.
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 5;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("service '{name}' has invalid base URL '{url}': {reason}")]
    BaseUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("route prefix '{0}' must start with '/'")]
    RoutePrefix(String),

    #[error("duplicate route prefix '{0}'")]
    DuplicateRoute(String),

    #[error("route '{prefix}' targets unknown service '{service}'")]
    UnknownRouteService { prefix: String, service: String },

    #[error("upgrade path prefix '{0}' must name a path below '/'")]
    UpgradePrefix(String),

    #[error("upgrade path prefix '{upgrade}' overlaps route prefix '{route}'")]
    UpgradeRouteOverlap { upgrade: String, route: String },

    #[error("upgrade path targets unknown service '{0}'")]
    UnknownUpgradeService(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("health check timeout must be between 1 and {MAX_PROBE_TIMEOUT_SECS} seconds, got {0}")]
    ProbeTimeout(u64),
}

/// Validate a fully-assembled configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut names = HashSet::new();
    for service in &config.services {
        if service.name.is_empty() {
            errors.push(ValidationError::EmptyServiceName);
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }
        if let Err(reason) = check_base_url(&service.base_url) {
            errors.push(ValidationError::BaseUrl {
                name: service.name.clone(),
                url: service.base_url.clone(),
                reason,
            });
        }
    }

    let mut prefixes = HashSet::new();
    for route in &config.routes {
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::RoutePrefix(route.path_prefix.clone()));
        }
        if let Some(rewrite) = &route.rewrite_prefix {
            if !rewrite.starts_with('/') {
                errors.push(ValidationError::RoutePrefix(rewrite.clone()));
            }
        }
        if !prefixes.insert(route.path_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicateRoute(route.path_prefix.clone()));
        }
        if !names.contains(route.service.as_str()) {
            errors.push(ValidationError::UnknownRouteService {
                prefix: route.path_prefix.clone(),
                service: route.service.clone(),
            });
        }
    }

    if config.upgrade.enabled {
        let prefix = &config.upgrade.path_prefix;
        if !prefix.starts_with('/') {
            errors.push(ValidationError::RoutePrefix(prefix.clone()));
        } else if prefix.trim_end_matches('/').is_empty() {
            errors.push(ValidationError::UpgradePrefix(prefix.clone()));
        } else {
            let upgrade = PathPrefixMatcher::new(prefix.as_str());
            for route in config.routes.iter().filter(|r| r.path_prefix.starts_with('/')) {
                let matcher = PathPrefixMatcher::new(route.path_prefix.as_str());
                if matcher.matches(upgrade.prefix()) || upgrade.matches(matcher.prefix()) {
                    errors.push(ValidationError::UpgradeRouteOverlap {
                        upgrade: prefix.clone(),
                        route: route.path_prefix.clone(),
                    });
                }
            }
        }
        if !names.contains(config.upgrade.service.as_str()) {
            errors.push(ValidationError::UnknownUpgradeService(config.upgrade.service.clone()));
        }
        if config.upgrade.timeout_secs == 0 {
            errors.push(ValidationError::Zero("upgrade.timeout_secs"));
        }
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }
    if health.timeout_secs == 0 || health.timeout_secs > MAX_PROBE_TIMEOUT_SECS {
        errors.push(ValidationError::ProbeTimeout(health.timeout_secs));
    }
    if health.unhealthy_threshold == 0 {
        errors.push(ValidationError::Zero("health_check.unhealthy_threshold"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_ms == 0 {
            errors.push(ValidationError::Zero("rate_limit.window_ms"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::Zero("rate_limit.max_requests"));
        }
        if config.rate_limit.max_clients == 0 {
            errors.push(ValidationError::Zero("rate_limit.max_clients"));
        }
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.upstream_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_base_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("query and fragment are not allowed".to_string());
    }
    Ok(())
}

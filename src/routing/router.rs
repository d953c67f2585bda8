//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled route rules
//! - Pick the longest matching prefix for a request path
//! - Gate on service health and rewrite the path for forwarding
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan over rules sorted longest-first
//! - Explicit `RouteNotFound` rather than a silent default

use crate::config::RouteConfig;
use crate::error::GatewayError;
use crate::health::ServiceRegistry;
use crate::routing::matcher::PathPrefixMatcher;

/// A static prefix rewrite rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    matcher: PathPrefixMatcher,
    target_service: String,
    rewrite_prefix: String,
}

impl RouteRule {
    pub fn new(
        path_prefix: impl Into<String>,
        target_service: impl Into<String>,
        rewrite_prefix: impl Into<String>,
    ) -> Self {
        let rewrite_prefix = rewrite_prefix.into().trim_end_matches('/').to_string();
        Self {
            matcher: PathPrefixMatcher::new(path_prefix),
            target_service: target_service.into(),
            rewrite_prefix,
        }
    }

    pub fn path_prefix(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn target_service(&self) -> &str {
        &self.target_service
    }

    /// Replace the matched prefix with the rewrite prefix, keeping the rest of
    /// the path and the query string. `None` if the rule does not match.
    pub fn rewrite(&self, path_and_query: &str) -> Option<String> {
        let rest = self.matcher.strip(path_and_query)?;
        let mut rewritten = String::with_capacity(self.rewrite_prefix.len() + rest.len() + 1);
        rewritten.push_str(&self.rewrite_prefix);
        if rewritten.is_empty() && !rest.starts_with('/') {
            rewritten.push('/');
        }
        rewritten.push_str(rest);
        Some(rewritten)
    }
}

impl From<&RouteConfig> for RouteRule {
    fn from(config: &RouteConfig) -> Self {
        let rewrite = config
            .rewrite_prefix
            .clone()
            .unwrap_or_else(|| config.path_prefix.clone());
        RouteRule::new(config.path_prefix.clone(), config.service.clone(), rewrite)
    }
}

/// Where a request should go once it has passed routing and the health gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPlan {
    pub service: String,
    pub base_url: String,
    pub path_and_query: String,
}

impl ForwardPlan {
    pub fn target_uri(&self) -> String {
        format!("{}{}", self.base_url, self.path_and_query)
    }
}

/// The compiled route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    /// Prefixes in configuration order, for client-facing listings.
    listed: Vec<String>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        let listed = rules.iter().map(|r| r.path_prefix().to_string()).collect();
        let mut rules = rules;
        // Longest prefix first; stable sort keeps config order among equals.
        rules.sort_by(|a, b| b.path_prefix().len().cmp(&a.path_prefix().len()));
        Self { rules, listed }
    }

    pub fn from_config(routes: &[RouteConfig]) -> Self {
        Self::new(routes.iter().map(RouteRule::from).collect())
    }

    /// Longest rule whose prefix matches `path`.
    pub fn resolve(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(path))
    }

    /// Configured prefixes in the form shown to clients (`/api/auth/*`).
    pub fn available_routes(&self) -> Vec<String> {
        self.listed.iter().map(|p| format!("{p}/*")).collect()
    }

    /// Rules in configuration order.
    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.listed
            .iter()
            .filter_map(|prefix| self.rules.iter().find(|r| r.path_prefix() == prefix))
    }

    /// Resolve, health-gate and rewrite a request target.
    ///
    /// Never touches the network: an unhealthy target fails here, before any
    /// backend call.
    pub fn dispatch(
        &self,
        registry: &ServiceRegistry,
        path_and_query: &str,
    ) -> Result<ForwardPlan, GatewayError> {
        let path = path_and_query.split('?').next().unwrap_or_default();

        let rule = self.resolve(path).ok_or_else(|| GatewayError::RouteNotFound {
            path: path.to_string(),
            available: self.available_routes(),
        })?;

        let service = rule.target_service();
        if !registry.is_healthy(service) {
            return Err(GatewayError::ServiceUnavailable {
                service: service.to_string(),
            });
        }

        // Validation guarantees registration; an unregistered target reads as unhealthy above.
        let base_url = registry.base_url(service).unwrap_or_default();
        let path_and_query = rule
            .rewrite(path_and_query)
            .unwrap_or_else(|| path_and_query.to_string());

        Ok(ForwardPlan {
            service: service.to_string(),
            base_url: base_url.to_string(),
            path_and_query,
        })
    }
}

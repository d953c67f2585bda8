//! Service registry.
//!
//! # Responsibilities
//! - Hold one descriptor per backend service, registered at startup
//! - Answer "is this service healthy?" for every proxied request
//! - Apply probe outcomes from the health monitor
//! - Produce owned snapshots for diagnostics
//!
//! # Design Decisions
//! - The name → entry table is immutable once the registry is shared
//! - Each entry guards its health fields with its own mutex, so a probe
//!   update for one service never blocks readers of another
//! - Readers copy the whole health state under the lock (no torn reads)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Registry errors raised at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service '{0}' is already registered")]
    DuplicateService(String),
}

/// Point-in-time copy of a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy)]
struct HealthState {
    healthy: bool,
    last_checked_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

#[derive(Debug)]
struct ServiceEntry {
    name: String,
    base_url: String,
    state: Mutex<HealthState>,
}

impl ServiceEntry {
    fn state(&self) -> MutexGuard<'_, HealthState> {
        // Plain data, written field by field under the lock; safe to recover.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn descriptor(&self) -> ServiceDescriptor {
        let state = *self.state();
        ServiceDescriptor {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            healthy: state.healthy,
            last_checked_at: state.last_checked_at,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

/// Process-wide table of backend services and their live health.
#[derive(Debug)]
pub struct ServiceRegistry {
    entries: Vec<Arc<ServiceEntry>>,
    index: HashMap<String, usize>,
    failure_threshold: u32,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ServiceRegistry {
    /// Create an empty registry.
    ///
    /// `failure_threshold` is the number of consecutive failed probes that mark a
    /// service unhealthy; 1 flips on the first failure. Values below 1 are
    /// treated as 1.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Register a service. It starts out healthy since no probe has run yet.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateService(name));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!(service = %name, base_url = %base_url, "Service registered");

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(Arc::new(ServiceEntry {
            name,
            base_url,
            state: Mutex::new(HealthState {
                healthy: true,
                last_checked_at: None,
                consecutive_failures: 0,
            }),
        }));
        Ok(())
    }

    fn entry(&self, name: &str) -> Option<&Arc<ServiceEntry>> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Current health of `name`; unknown services are never healthy.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|entry| entry.state().healthy)
    }

    /// Base URL of `name`, without trailing slash.
    pub fn base_url(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|entry| entry.base_url.as_str())
    }

    pub fn descriptor(&self, name: &str) -> Option<ServiceDescriptor> {
        self.entry(name).map(|entry| entry.descriptor())
    }

    /// Apply one probe outcome. Returns the updated descriptor, or `None` if
    /// the service is not registered.
    pub fn record_probe_result(&self, name: &str, success: bool) -> Option<ServiceDescriptor> {
        let entry = self.entry(name)?;
        {
            let mut state = entry.state();
            state.last_checked_at = Some(Utc::now());
            if success {
                state.healthy = true;
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                if state.consecutive_failures >= self.failure_threshold {
                    state.healthy = false;
                }
            }
        }
        Some(entry.descriptor())
    }

    /// Owned copies of every descriptor, in registration order.
    pub fn snapshot(&self) -> Vec<ServiceDescriptor> {
        self.entries.iter().map(|entry| entry.descriptor()).collect()
    }

    /// `(name, base_url)` pairs in registration order.
    pub fn services(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.base_url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     GatewayConfig.services → registry.rs (register, optimistic healthy)
//!
//! Active health checks (active.rs):
//!     Periodic timer
//!     → GET {base_url}/health per service, each in its own task
//!     → registry.record_probe_result
//!
//! Request path:
//!     routing dispatch → registry.is_healthy (fail fast when false)
//! ```
//!
//! # Design Decisions
//! - Health state is binary; the failure threshold defaults to one probe
//! - Only the health monitor writes; every request reads

pub mod active;
pub mod registry;

pub use active::HealthMonitor;
pub use registry::{RegistryError, ServiceDescriptor, ServiceRegistry};

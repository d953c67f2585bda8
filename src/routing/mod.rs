//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path + query
//!     → router.rs (longest prefix lookup)
//!     → matcher.rs (segment-boundary prefix test)
//!     → registry health gate
//!     → Return: ForwardPlan (service, base URL, rewritten path) or GatewayError
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → RouteRule (prefix, target, rewrite)
//!     → Sort longest prefix first
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{ForwardPlan, RouteRule, RouteTable};

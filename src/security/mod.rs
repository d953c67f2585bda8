//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP fixed window, before routing)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to backend
//!
//! Outgoing response:
//!     → headers.rs (strip hop-by-hop, add security headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: over-budget clients never reach routing
//! - No trust in client-supplied forwarding headers

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, Admission, RateLimiter};

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → [admission: security::rate_limit]
//!     → diagnostics.rs | websocket.rs (upgrade prefix) | proxy.rs (everything else)
//!     → Send to client
//! ```

pub mod diagnostics;
pub mod proxy;
pub mod request;
pub mod server;
pub mod websocket;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};

//! API gateway library: routing, health gating, admission control and
//! WebSocket tunnelling in front of a set of backend services.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownSignal};

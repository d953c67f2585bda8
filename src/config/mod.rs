//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, then .env / environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to HttpServer, which builds the registry, routes and limiter
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes and services are fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::GatewayConfig;
pub use schema::HealthCheckConfig;
pub use schema::ListenerConfig;
pub use schema::RateLimitConfig;
pub use schema::RouteConfig;
pub use schema::ServiceConfig;
pub use schema::UpgradeConfig;

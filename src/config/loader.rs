//! Configuration loading from disk and environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::health::RegistryError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for environment variable {var}")]
    Env { var: String, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: TOML file (or defaults), then `.env` and process
/// environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    if let Ok(env_file) = dotenvy::dotenv() {
        tracing::debug!(path = %env_file.display(), "Loaded .env file");
    }
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply deployment overrides using `lookup` to read variables.
///
/// Recognised variables: `PORT`, `{NAME}_SERVICE_URL` per configured service,
/// `CLIENT_URL`, `RATE_LIMIT_WINDOW_MS`, `RATE_LIMIT_MAX_REQUESTS`,
/// `HEALTH_CHECK_INTERVAL_SECS`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        let port: u16 = parse_var("PORT", &port)?;
        config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("0.0.0.0:{port}"),
        };
    }

    for service in &mut config.services {
        let var = format!("{}_SERVICE_URL", service.name.to_uppercase().replace('-', "_"));
        if let Some(url) = lookup(&var) {
            service.base_url = url;
        }
    }

    if let Some(origin) = lookup("CLIENT_URL") {
        config.cors.allowed_origin = origin;
    }
    if let Some(window) = lookup("RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.window_ms = parse_var("RATE_LIMIT_WINDOW_MS", &window)?;
    }
    if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS") {
        config.rate_limit.max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", &max)?;
    }
    if let Some(interval) = lookup("HEALTH_CHECK_INTERVAL_SECS") {
        config.health_check.interval_secs = parse_var("HEALTH_CHECK_INTERVAL_SECS", &interval)?;
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

//! Configuration loader

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use std::path::Path;

use super::types::{AppConfig, AutoCancelConfig, BackendConfig};
use crate::common::errors::{HedgeError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. APP__BACKEND__AUTH_TOKEN)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| HedgeError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| HedgeError::Configuration(e.to_string()))?;
    app_config.validate()?;
    Ok(app_config)
}

/// Load configuration from environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let backend = BackendConfig {
        base_url: std::env::var("HEDGE_BACKEND_URL")
            .unwrap_or_else(|_| BackendConfig::default().base_url),
        auth_token: std::env::var("HEDGE_AUTH_TOKEN").ok(),
        request_timeout_seconds: std::env::var("HEDGE_REQUEST_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| BackendConfig::default().request_timeout_seconds),
    };

    let auto_cancel = AutoCancelConfig {
        enabled: std::env::var("HEDGE_AUTO_CANCEL_ENABLED")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false),
        threshold: std::env::var("HEDGE_AUTO_CANCEL_THRESHOLD")
            .ok()
            .and_then(|v| v.trim().parse::<Decimal>().ok()),
    };

    let config = AppConfig {
        backend,
        auto_cancel,
        ..AppConfig::default()
    };
    config.validate()?;
    Ok(config)
}

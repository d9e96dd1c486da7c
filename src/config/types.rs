//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::errors::{HedgeError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Subscription backend configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Position sizing parameters
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Balance pre-flight thresholds
    #[serde(default)]
    pub balance: BalanceConfig,
    /// Auto-cancel policy
    #[serde(default)]
    pub auto_cancel: AutoCancelConfig,
    /// Notification bus settings
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend.base_url).map_err(|e| {
            HedgeError::Configuration(format!("Invalid backend URL {}: {}", self.backend.base_url, e))
        })?;
        if self.backend.request_timeout_seconds == 0 {
            return Err(HedgeError::Configuration(
                "request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.sizing.taker_fee_rate < Decimal::ZERO {
            return Err(HedgeError::Configuration(
                "taker_fee_rate must not be negative".to_string(),
            ));
        }
        if self.auto_cancel.enabled && self.auto_cancel.threshold.is_none() {
            warn!("Auto-cancel is enabled without a threshold; the sweep will not cancel anything");
        }
        Ok(())
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL for the backend REST API
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Session token sent as `Authorization: Bearer ...`
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            auth_token: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

/// Position sizing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Taker fee rate charged once on entry and once on exit
    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: Decimal,
    /// Highest leverage accepted by the sizer
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            taker_fee_rate: default_taker_fee_rate(),
            max_leverage: default_max_leverage(),
        }
    }
}

fn default_taker_fee_rate() -> Decimal {
    dec!(0.0005)
}

fn default_max_leverage() -> u32 {
    125
}

/// Balance pre-flight thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Available margin below this amount raises a warning
    #[serde(default = "default_low_balance_threshold")]
    pub low_balance_threshold: Decimal,
    /// Balances at or above this value come from unmetered simulated accounts
    #[serde(default = "default_unlimited_sentinel")]
    pub unlimited_sentinel: Decimal,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            low_balance_threshold: default_low_balance_threshold(),
            unlimited_sentinel: default_unlimited_sentinel(),
        }
    }
}

fn default_low_balance_threshold() -> Decimal {
    dec!(10)
}

fn default_unlimited_sentinel() -> Decimal {
    dec!(999999999)
}

/// Auto-cancel policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoCancelConfig {
    /// Whether the sweep cancels anything at all
    #[serde(default)]
    pub enabled: bool,
    /// Funding-rate magnitude below which an imminent subscription is withdrawn
    #[serde(default)]
    pub threshold: Option<Decimal>,
}

/// Notification bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Seconds a notification stays visible
    #[serde(default = "default_notification_ttl")]
    pub ttl_seconds: u64,
    /// Maximum notifications retained at once
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_notification_ttl(),
            max_retained: default_max_retained(),
        }
    }
}

fn default_notification_ttl() -> u64 {
    5
}

fn default_max_retained() -> usize {
    50
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

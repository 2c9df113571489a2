//! Configuration management for Soteria
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{Result, SoteriaError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Power station (EcoFlow) API credentials
    pub ecoflow: EcoflowConfig,

    /// Smart plug (SwitchBot) API credentials
    pub switchbot: SwitchbotConfig,

    /// SoC safety thresholds and fail-safe tuning
    pub thresholds: ThresholdsConfig,

    /// Notification channel credentials
    pub notify: NotifyConfig,

    /// Durable store configuration
    pub store: StoreConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Interval between scheduled poll cycles, in seconds
    pub poll_interval_secs: u64,
}

/// EcoFlow Open API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EcoflowConfig {
    /// API access key
    pub access_key: String,

    /// API secret key
    pub secret_key: String,

    /// Device serial number to query
    pub device_sn: String,
}

/// SwitchBot API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwitchbotConfig {
    /// API token
    pub token: String,

    /// API secret (reserved for signed requests)
    pub secret: String,

    /// Device id of the charger plug. Empty means no plug is configured and
    /// forced-on actuation is skipped.
    pub plug_device_id: String,
}

/// SoC threshold bands and fail-safe tuning
///
/// Bands must be ordered `panic <= critical <= caution <= safe`; `validate()`
/// rejects any other arrangement at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Below this, manual charge-off requires an explicit override with reason
    pub soc_safe_min: u8,

    /// At or below this, polling forces the charger on (caution alert)
    pub soc_caution_min: u8,

    /// At or below this, polling forces the charger on (critical alert);
    /// manual charge-off is rejected unconditionally below this
    pub soc_critical_min: u8,

    /// At or below this, polling forces the charger on (panic alert)
    pub soc_panic_min: u8,

    /// Consecutive poll failures before the fail-safe forces the charger on
    pub poll_failure_threshold: u32,
}

/// Notification channel credentials; empty values mean the channel is skipped
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// LINE Notify token
    pub line_token: String,

    /// Resend API key for the email channel
    pub resend_api_key: String,

    /// Email sender address
    pub email_from: String,

    /// Email recipient address
    pub email_to: String,
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the JSON state file. Empty means the store is not configured
    /// and the supervisor refuses to operate.
    pub path: String,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Bearer secret required to trigger a poll cycle over HTTP
    pub cron_secret: String,

    /// PIN required as step-up evidence for manual charge-off. Empty means
    /// step-up verification is unavailable and charge-off is always rejected.
    pub control_pin: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            soc_safe_min: 40,
            soc_caution_min: 35,
            soc_critical_min: 25,
            soc_panic_min: 15,
            poll_failure_threshold: 3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "soteria_state.json".to_string(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            cron_secret: String::new(),
            control_pin: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/soteria.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "soteria_config.yaml",
            "/data/soteria_config.yaml",
            "/etc/soteria/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration; called once at startup before anything runs
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.soc_panic_min <= t.soc_critical_min
            && t.soc_critical_min <= t.soc_caution_min
            && t.soc_caution_min <= t.soc_safe_min)
        {
            return Err(SoteriaError::validation(
                "thresholds".to_string(),
                format!(
                    "bands must satisfy panic <= critical <= caution <= safe, got {} <= {} <= {} <= {}",
                    t.soc_panic_min, t.soc_critical_min, t.soc_caution_min, t.soc_safe_min
                ),
            ));
        }

        if t.soc_safe_min > 100 {
            return Err(SoteriaError::validation(
                "thresholds.soc_safe_min",
                "Must be a percentage (0-100)",
            ));
        }

        if t.poll_failure_threshold == 0 {
            return Err(SoteriaError::validation(
                "thresholds.poll_failure_threshold",
                "Must be at least 1",
            ));
        }

        if self.store.path.trim().is_empty() {
            return Err(SoteriaError::validation(
                "store.path",
                "Store path cannot be empty",
            ));
        }

        if self.web.port == 0 {
            return Err(SoteriaError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(SoteriaError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Plug device id if one is configured
    pub fn plug_device_id(&self) -> Option<&str> {
        let id = self.switchbot.plug_device_id.trim();
        if id.is_empty() { None } else { Some(id) }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ecoflow: EcoflowConfig::default(),
            switchbot: SwitchbotConfig::default(),
            thresholds: ThresholdsConfig::default(),
            notify: NotifyConfig::default(),
            store: StoreConfig::default(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_secs: 120,
        }
    }
}

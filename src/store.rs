//! Durable store for supervisor state and audit rows
//!
//! This module persists the singleton `SystemStatus`, the append-only device
//! state history, the operation audit log, and the notification log. The
//! `StateStore` trait is the seam the supervisor and control guard talk to;
//! `JsonStore` is the file-backed implementation. The store's internal mutex
//! doubles as the exclusive-update lock that serializes poll cycles.

use crate::error::{Result, SoteriaError};
use crate::logging::get_logger;
use crate::notify::AlertSlug;
use crate::switchbot::PlugState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Singleton supervisor state. Mutated only through the poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemStatus {
    /// Timestamp of the last successful poll cycle
    pub last_poll_at: Option<DateTime<Utc>>,

    /// SoC percentage from the last successful poll
    pub last_success_soc: Option<u8>,

    /// Consecutive failed poll cycles since the last success
    pub poll_failure_count: u32,
}

/// Which device a state row was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    Ecoflow,
    Switchbot,
}

impl DeviceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecoflow => "ecoflow",
            Self::Switchbot => "switchbot",
        }
    }
}

/// Append-only device telemetry row; opaque to the decision logic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStateRecord {
    pub id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub source: DeviceSource,
    pub soc: Option<u8>,
    pub watts_in: Option<f64>,
    pub watts_out: Option<f64>,
    pub switchbot_state: Option<PlugState>,
    pub raw_payload: serde_json::Value,
}

/// Audited action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    ChargeOn,
    ChargeOff,
    NotifySuppressed,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeOn => "CHARGE_ON",
            Self::ChargeOff => "CHARGE_OFF",
            Self::NotifySuppressed => "NOTIFY_SUPPRESSED",
        }
    }
}

/// Append-only audit row; the sole write path for actuations and suppressions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: Uuid,
    pub logged_at: DateTime<Utc>,
    /// `"system"` for automated actions, a user identifier otherwise
    pub actor_id: String,
    pub action: LogAction,
    pub target: String,
    pub reason: String,
    pub is_auto: bool,
    pub details: serde_json::Value,
}

impl OperationLogEntry {
    /// Create a new audit row timestamped now
    pub fn new(
        actor_id: &str,
        action: LogAction,
        target: &str,
        reason: &str,
        is_auto: bool,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            logged_at: Utc::now(),
            actor_id: actor_id.to_string(),
            action,
            target: target.to_string(),
            reason: reason.to_string(),
            is_auto,
            details,
        }
    }
}

/// Append-only row per successfully sent alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub alert_slug: AlertSlug,
    pub sent_at: DateTime<Utc>,
    /// Comma-joined list of channels that accepted the send
    pub channel: String,
    pub payload: serde_json::Value,
}

/// Storage seam for the supervisor, control guard, and cooldown gate
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Read the singleton status row if it exists
    async fn system_status(&self) -> Result<Option<SystemStatus>>;

    /// Create the singleton status row with zero counters if missing
    async fn ensure_system_status(&self) -> Result<SystemStatus>;

    /// Atomically record a successful cycle: set `last_poll_at`, reset the
    /// failure counter, store the new SoC
    async fn record_poll_success(&self, at: DateTime<Utc>, soc: u8) -> Result<()>;

    /// Increment the failure counter by one; returns the new count
    async fn record_poll_failure(&self) -> Result<u32>;

    /// Append telemetry rows collected in one cycle
    async fn append_device_states(&self, rows: Vec<DeviceStateRecord>) -> Result<()>;

    /// Append an audit row
    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()>;

    /// Append a sent-notification row
    async fn append_notification(&self, record: NotificationRecord) -> Result<()>;

    /// Most recent notification for a slug, if any
    async fn latest_notification(&self, slug: AlertSlug) -> Result<Option<NotificationRecord>>;

    /// Full audit log, oldest first
    async fn operation_logs(&self) -> Result<Vec<OperationLogEntry>>;

    /// Full telemetry history, oldest first
    async fn device_states(&self) -> Result<Vec<DeviceStateRecord>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreData {
    system_status: Option<SystemStatus>,
    device_states: Vec<DeviceStateRecord>,
    operation_logs: Vec<OperationLogEntry>,
    notifications: Vec<NotificationRecord>,
}

/// JSON-file-backed store
pub struct JsonStore {
    file_path: String,
    data: tokio::sync::Mutex<StoreData>,
    logger: crate::logging::StructuredLogger,
}

impl JsonStore {
    /// Open the store at `path`, loading existing state from disk.
    ///
    /// An empty path means the store is not configured; that is a hard error,
    /// never substituted with an in-memory fallback.
    pub fn open(path: &str) -> Result<Self> {
        let logger = get_logger("store");
        if path.trim().is_empty() {
            return Err(SoteriaError::store(
                "Store not configured: set store.path in the configuration",
            ));
        }

        let data = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            let data: StoreData = serde_json::from_str(&contents)
                .map_err(|e| SoteriaError::store(format!("Corrupt state file {}: {}", path, e)))?;
            logger.info(&format!("Loaded state from {}", path));
            data
        } else {
            logger.info(&format!("No state file at {}, starting empty", path));
            StoreData::default()
        };

        Ok(Self {
            file_path: path.to_string(),
            data: tokio::sync::Mutex::new(data),
            logger,
        })
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved state to disk");
        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStore {
    async fn system_status(&self) -> Result<Option<SystemStatus>> {
        let data = self.data.lock().await;
        Ok(data.system_status.clone())
    }

    async fn ensure_system_status(&self) -> Result<SystemStatus> {
        let mut data = self.data.lock().await;
        if data.system_status.is_none() {
            data.system_status = Some(SystemStatus::default());
            self.save(&data)?;
            self.logger.info("Created singleton system status row");
        }
        Ok(data.system_status.clone().unwrap_or_default())
    }

    async fn record_poll_success(&self, at: DateTime<Utc>, soc: u8) -> Result<()> {
        let mut data = self.data.lock().await;
        let status = data.system_status.get_or_insert_with(SystemStatus::default);
        status.last_poll_at = Some(at);
        status.last_success_soc = Some(soc.min(100));
        status.poll_failure_count = 0;
        self.save(&data)
    }

    async fn record_poll_failure(&self) -> Result<u32> {
        let mut data = self.data.lock().await;
        let status = data.system_status.get_or_insert_with(SystemStatus::default);
        status.poll_failure_count = status.poll_failure_count.saturating_add(1);
        let count = status.poll_failure_count;
        self.save(&data)?;
        Ok(count)
    }

    async fn append_device_states(&self, rows: Vec<DeviceStateRecord>) -> Result<()> {
        let mut data = self.data.lock().await;
        data.device_states.extend(rows);
        self.save(&data)
    }

    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()> {
        let mut data = self.data.lock().await;
        data.operation_logs.push(entry);
        self.save(&data)
    }

    async fn append_notification(&self, record: NotificationRecord) -> Result<()> {
        let mut data = self.data.lock().await;
        data.notifications.push(record);
        self.save(&data)
    }

    async fn latest_notification(&self, slug: AlertSlug) -> Result<Option<NotificationRecord>> {
        let data = self.data.lock().await;
        Ok(data
            .notifications
            .iter()
            .filter(|n| n.alert_slug == slug)
            .max_by_key(|n| n.sent_at)
            .cloned())
    }

    async fn operation_logs(&self) -> Result<Vec<OperationLogEntry>> {
        let data = self.data.lock().await;
        Ok(data.operation_logs.clone())
    }

    async fn device_states(&self) -> Result<Vec<DeviceStateRecord>> {
        let data = self.data.lock().await;
        Ok(data.device_states.clone())
    }
}

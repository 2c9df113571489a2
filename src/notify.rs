//! Alert dispatch with per-category cooldown
//!
//! Deduplicates outbound notifications per alert slug using a sliding
//! cooldown window over the persisted notification log. Suppressions are
//! audited as `NOTIFY_SUPPRESSED` operation-log entries. Channels send
//! independently; the alert counts as sent when at least one channel
//! accepted it, and only then is a notification row recorded, listing
//! exactly the channels that succeeded.

use crate::error::Result;
use crate::logging::get_logger;
use crate::store::{LogAction, NotificationRecord, OperationLogEntry, StateStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Alert categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSlug {
    LowSocCaution,
    LowSocCritical,
    LowSocPanic,
    PollFailure,
    ApiFatalError,
}

impl AlertSlug {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowSocCaution => "low_soc_caution",
            Self::LowSocCritical => "low_soc_critical",
            Self::LowSocPanic => "low_soc_panic",
            Self::PollFailure => "poll_failure",
            Self::ApiFatalError => "api_fatal_error",
        }
    }

    /// Minimum elapsed time between two sends of this category
    pub fn cooldown(&self) -> ChronoDuration {
        let minutes = match self {
            Self::LowSocCaution => 60,
            Self::LowSocCritical => 30,
            Self::LowSocPanic => 5,
            Self::PollFailure => 15,
            Self::ApiFatalError => 5,
        };
        ChronoDuration::minutes(minutes)
    }
}

/// Structured alert content shared by all channels
#[derive(Debug, Clone, Serialize, Default)]
pub struct AlertPayload {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_soc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AlertPayload {
    /// Render the payload as plain alert text
    pub fn format_text(&self) -> String {
        let mut lines = vec![format!("Timestamp: {}", self.timestamp)];
        if let Some(soc) = self.current_soc {
            lines.push(format!("Current SoC: {}%", soc));
        }
        if let Some(ref id) = self.device_id {
            lines.push(format!("Device: {}", id));
        }
        if let Some(ref action) = self.action_taken {
            lines.push(format!("Action: {}", action));
        }
        if let Some(ref reason) = self.reason {
            lines.push(format!("Reason: {}", reason));
        }
        lines.join("\n")
    }
}

/// Outcome of one `send_alert` call
#[derive(Debug, Clone, Default)]
pub struct NotifyOutcome {
    pub sent: bool,
    pub suppressed: bool,
    /// Channels that accepted the send
    pub channels: Vec<String>,
}

/// One delivery channel. Absence of credentials is a soft skip, not an error.
#[async_trait::async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether credentials are present; unconfigured channels are skipped
    fn is_configured(&self) -> bool;

    /// Deliver the alert; returns whether the channel accepted it
    async fn send(&self, subject: &str, body: &str) -> Result<bool>;
}

/// LINE Notify push channel
pub struct LineChannel {
    token: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { token, client })
    }
}

#[async_trait::async_trait]
impl AlertChannel for LineChannel {
    fn name(&self) -> &'static str {
        "line"
    }

    fn is_configured(&self) -> bool {
        !self.token.trim().is_empty()
    }

    async fn send(&self, subject: &str, body: &str) -> Result<bool> {
        let message = format!("{}\n{}", subject, body);
        let resp = self
            .client
            .post("https://notify-api.line.me/api/notify")
            .header("Authorization", format!("Bearer {}", self.token.trim()))
            .form(&[("message", message.as_str())])
            .send()
            .await?;
        Ok(resp.status().is_success())
    }
}

/// Resend-backed email channel
pub struct EmailChannel {
    api_key: String,
    from: String,
    to: String,
    client: reqwest::Client,
}

impl EmailChannel {
    pub fn new(api_key: String, from: String, to: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            api_key,
            from,
            to,
            client,
        })
    }
}

#[async_trait::async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.to.trim().is_empty()
    }

    async fn send(&self, subject: &str, body: &str) -> Result<bool> {
        let from = if self.from.trim().is_empty() {
            "alerts@example.com"
        } else {
            self.from.trim()
        };
        let resp = self
            .client
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .json(&serde_json::json!({
                "from": from,
                "to": [self.to.trim()],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }
}

/// Cooldown-gated alert dispatcher
pub struct Notifier {
    store: Arc<dyn StateStore>,
    channels: Vec<Box<dyn AlertChannel>>,
    logger: crate::logging::StructuredLogger,
}

impl Notifier {
    /// Create a notifier over the given channels
    pub fn new(store: Arc<dyn StateStore>, channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self {
            store,
            channels,
            logger: get_logger("notify"),
        }
    }

    /// Whether the cooldown window allows a send for this slug right now
    async fn should_send(&self, slug: AlertSlug) -> Result<(bool, Option<DateTime<Utc>>)> {
        let last = self.store.latest_notification(slug).await?;
        let Some(last) = last else {
            return Ok((true, None));
        };
        let elapsed = Utc::now() - last.sent_at;
        Ok((elapsed >= slug.cooldown(), Some(last.sent_at)))
    }

    /// Send an alert unless it is inside its cooldown window.
    ///
    /// Suppression is audited; channel failures are logged and non-fatal.
    pub async fn send_alert(&self, slug: AlertSlug, payload: &AlertPayload) -> Result<NotifyOutcome> {
        let (send, last_sent_at) = self.should_send(slug).await?;

        if !send {
            let last_str = last_sent_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            let entry = OperationLogEntry::new(
                "system",
                LogAction::NotifySuppressed,
                "notifications",
                &format!(
                    "Alert {} suppressed (cooldown), last sent {}",
                    slug.as_str(),
                    last_str
                ),
                true,
                serde_json::json!({
                    "alert_slug": slug.as_str(),
                    "payload": payload,
                    "last_sent_at": last_str,
                }),
            );
            if let Err(e) = self.store.append_operation_log(entry).await {
                self.logger
                    .warn(&format!("Failed to log suppressed alert: {}", e));
            }
            self.logger.debug(&format!(
                "Alert {} suppressed by cooldown",
                slug.as_str()
            ));
            return Ok(NotifyOutcome {
                sent: false,
                suppressed: true,
                channels: Vec::new(),
            });
        }

        let subject = format!("[Soteria] {}", slug.as_str().replace('_', " "));
        let body = payload.format_text();

        let mut accepted: Vec<String> = Vec::new();
        for channel in &self.channels {
            if !channel.is_configured() {
                self.logger.warn(&format!(
                    "Channel {} not configured, skipping",
                    channel.name()
                ));
                continue;
            }
            match channel.send(&subject, &body).await {
                Ok(true) => accepted.push(channel.name().to_string()),
                Ok(false) => self
                    .logger
                    .warn(&format!("Channel {} rejected alert", channel.name())),
                Err(e) => self
                    .logger
                    .error(&format!("Channel {} error: {}", channel.name(), e)),
            }
        }

        if !accepted.is_empty() {
            let record = NotificationRecord {
                id: Uuid::new_v4(),
                alert_slug: slug,
                sent_at: Utc::now(),
                channel: accepted.join(","),
                payload: serde_json::to_value(payload)?,
            };
            self.store.append_notification(record).await?;
            self.logger.info(&format!(
                "Alert {} sent via {}",
                slug.as_str(),
                accepted.join(",")
            ));
        } else {
            self.logger
                .warn(&format!("Alert {} accepted by no channel", slug.as_str()));
        }

        Ok(NotifyOutcome {
            sent: !accepted.is_empty(),
            suppressed: false,
            channels: accepted,
        })
    }
}

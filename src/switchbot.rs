//! SwitchBot smart plug collaborator
//!
//! Read the charger plug's on/off state and send on/off commands over the
//! SwitchBot REST API. The `PlugController` trait is the seam the supervisor
//! and control guard actuate through; transport details stay in here.

use crate::error::{Result, SoteriaError};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SWITCHBOT_BASE: &str = "https://api.switch-bot.com";
// Status: v1.1; Commands: v1.0 (OpenWonderLabs/SwitchBotAPI)

/// Known plug switch states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlugState {
    On,
    Off,
    Unknown,
}

impl PlugState {
    pub fn from_label(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ON" => Self::On,
            "OFF" => Self::Off,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Outcome of a plug command. `ok: false` is a failed actuation even when the
/// HTTP call itself succeeded.
#[derive(Debug, Clone)]
pub struct ActuationResult {
    pub ok: bool,
    pub raw: serde_json::Value,
}

/// Plug read/write collaborator
#[async_trait::async_trait]
pub trait PlugController: Send + Sync {
    /// Current switch state of the plug
    async fn plug_state(&self, device_id: &str) -> Result<PlugState>;

    /// Switch the plug on or off
    async fn set_plug_state(&self, device_id: &str, on: bool) -> Result<ActuationResult>;
}

/// SwitchBot REST API client
pub struct SwitchbotClient {
    token: String,
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl SwitchbotClient {
    /// Create a new client; actuation calls carry a bounded 10s timeout
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            token,
            client,
            logger: get_logger("switchbot"),
        })
    }

    fn require_token(&self) -> Result<&str> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(SoteriaError::config("SwitchBot token not configured"));
        }
        Ok(token)
    }
}

#[async_trait::async_trait]
impl PlugController for SwitchbotClient {
    async fn plug_state(&self, device_id: &str) -> Result<PlugState> {
        let token = self.require_token()?;

        let url = format!("{}/v1.1/devices/{}/status", SWITCHBOT_BASE, device_id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SoteriaError::device(format!(
                "SwitchBot status error {}: {}",
                status, text
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let power = body
            .get("body")
            .and_then(|b| b.get("power"))
            .and_then(|p| p.as_str())
            .unwrap_or("");
        Ok(PlugState::from_label(power))
    }

    async fn set_plug_state(&self, device_id: &str, on: bool) -> Result<ActuationResult> {
        let token = self.require_token()?;

        let command = if on { "turnOn" } else { "turnOff" };
        let url = format!("{}/v1.0/devices/{}/commands", SWITCHBOT_BASE, device_id);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", token)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "command": command,
                "parameter": "default",
                "commandType": "command",
            }))
            .send()
            .await?;

        let http_ok = resp.status().is_success();
        let raw: serde_json::Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
        // SwitchBot reports success as statusCode 100 in the body
        let ok = http_ok && raw.get("statusCode").and_then(|v| v.as_i64()) == Some(100);
        if !ok {
            self.logger.warn(&format!(
                "Plug command {} on {} did not report success",
                command, device_id
            ));
        }
        Ok(ActuationResult { ok, raw })
    }
}

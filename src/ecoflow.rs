//! EcoFlow power station collaborator
//!
//! Fetch a snapshot of the power station's state of charge and power flow
//! from the EcoFlow Open API. Response shapes vary across products, so the
//! parser accepts the common field aliases and clamps SoC to 0-100.

use crate::error::{Result, SoteriaError};
use crate::logging::get_logger;
use std::time::Duration;

const ECOFLOW_BASE: &str = "https://api.ecoflow.com";

/// One point-in-time reading from the power station
#[derive(Debug, Clone)]
pub struct EcoflowSnapshot {
    /// State of charge, percent
    pub soc: u8,
    /// Charging input power, watts
    pub watts_in: f64,
    /// Discharge output power, watts
    pub watts_out: f64,
    /// Raw vendor payload, persisted for history
    pub raw: serde_json::Value,
}

/// Power station read collaborator
#[async_trait::async_trait]
pub trait PowerStationReader: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<EcoflowSnapshot>;
}

/// EcoFlow Open API client
pub struct EcoflowClient {
    access_key: String,
    secret_key: String,
    device_sn: String,
    client: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl EcoflowClient {
    /// Create a new client; station reads carry a bounded 15s timeout
    pub fn new(access_key: String, secret_key: String, device_sn: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            access_key,
            secret_key,
            device_sn,
            client,
            logger: get_logger("ecoflow"),
        })
    }

    fn require_credentials(&self) -> Result<()> {
        if self.access_key.trim().is_empty()
            || self.secret_key.trim().is_empty()
            || self.device_sn.trim().is_empty()
        {
            return Err(SoteriaError::config(
                "EcoFlow not configured: set ecoflow.access_key, secret_key and device_sn",
            ));
        }
        Ok(())
    }
}

/// Pull a numeric field under any of the given aliases
fn field_f64(data: &serde_json::Value, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|k| data.get(*k).and_then(|v| v.as_f64()))
}

/// Normalize a vendor payload into a snapshot
pub(crate) fn parse_snapshot(body: serde_json::Value) -> EcoflowSnapshot {
    // Some products nest the readings under "data", some do not
    let inner = body.get("data").cloned().unwrap_or_else(|| body.clone());

    let soc = field_f64(&inner, &["soc", "socSum"]).unwrap_or(0.0);
    let watts_in = field_f64(&inner, &["wattsIn", "inputWatts"]).unwrap_or(0.0);
    let watts_out = field_f64(&inner, &["wattsOut", "outputWatts"]).unwrap_or(0.0);

    EcoflowSnapshot {
        soc: soc.clamp(0.0, 100.0).round() as u8,
        watts_in,
        watts_out,
        raw: body,
    }
}

#[async_trait::async_trait]
impl PowerStationReader for EcoflowClient {
    async fn fetch_snapshot(&self) -> Result<EcoflowSnapshot> {
        self.require_credentials()?;

        let url = format!(
            "{}/iot-open-api/device/query?sn={}",
            ECOFLOW_BASE, self.device_sn
        );
        let resp = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.access_key))
            .header("X-Access-Key", &self.access_key)
            .header("X-Secret-Key", &self.secret_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SoteriaError::device(format!(
                "EcoFlow API error {}: {}",
                status, text
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let snapshot = parse_snapshot(body);
        self.logger.debug(&format!(
            "Station snapshot: soc={}% in={}W out={}W",
            snapshot.soc, snapshot.watts_in, snapshot.watts_out
        ));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_data_payload() {
        let snap = parse_snapshot(serde_json::json!({
            "code": "0",
            "data": {"soc": 42, "wattsIn": 120.5, "wattsOut": 15.0}
        }));
        assert_eq!(snap.soc, 42);
        assert!((snap.watts_in - 120.5).abs() < f64::EPSILON);
        assert!((snap.watts_out - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_alias_fields_and_flat_payload() {
        let snap = parse_snapshot(serde_json::json!({
            "socSum": 87, "inputWatts": 300, "outputWatts": 0
        }));
        assert_eq!(snap.soc, 87);
        assert!((snap.watts_in - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamps_out_of_range_soc() {
        let snap = parse_snapshot(serde_json::json!({"data": {"soc": 250}}));
        assert_eq!(snap.soc, 100);
        let snap = parse_snapshot(serde_json::json!({"data": {"soc": -5}}));
        assert_eq!(snap.soc, 0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let snap = parse_snapshot(serde_json::json!({"data": {}}));
        assert_eq!(snap.soc, 0);
        assert_eq!(snap.watts_in, 0.0);
    }

    #[tokio::test]
    async fn missing_credentials_is_config_error() {
        let client =
            EcoflowClient::new(String::new(), String::new(), String::new()).unwrap();
        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, SoteriaError::Config { .. }));
    }
}

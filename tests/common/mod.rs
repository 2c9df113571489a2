#![allow(dead_code)]

use soteria::config::Config;
use soteria::ecoflow::{EcoflowSnapshot, PowerStationReader};
use soteria::error::{Result, SoteriaError};
use soteria::notify::AlertChannel;
use soteria::store::JsonStore;
use soteria::switchbot::{ActuationResult, PlugController, PlugState};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Power station double. `snapshot = None` simulates an API outage.
pub struct StubStation {
    pub snapshot: Option<EcoflowSnapshot>,
    pub fetch_calls: AtomicU32,
}

impl StubStation {
    pub fn with_soc(soc: u8) -> Self {
        Self {
            snapshot: Some(EcoflowSnapshot {
                soc,
                watts_in: 0.0,
                watts_out: 45.0,
                raw: serde_json::json!({ "soc": soc }),
            }),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            snapshot: None,
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PowerStationReader for StubStation {
    async fn fetch_snapshot(&self) -> Result<EcoflowSnapshot> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .clone()
            .ok_or_else(|| SoteriaError::device("simulated station outage"))
    }
}

/// Plug double recording every command it receives
pub struct StubPlug {
    pub state: Mutex<PlugState>,
    /// Whether commands are acknowledged (statusCode 100) or rejected
    pub ack: bool,
    pub commands: Mutex<Vec<(String, bool)>>,
}

impl StubPlug {
    pub fn new(state: PlugState) -> Self {
        Self {
            state: Mutex::new(state),
            ack: true,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(state: PlugState) -> Self {
        Self {
            state: Mutex::new(state),
            ack: false,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PlugController for StubPlug {
    async fn plug_state(&self, _device_id: &str) -> Result<PlugState> {
        Ok(*self.state.lock().unwrap())
    }

    async fn set_plug_state(&self, device_id: &str, on: bool) -> Result<ActuationResult> {
        self.commands
            .lock()
            .unwrap()
            .push((device_id.to_string(), on));
        if self.ack {
            *self.state.lock().unwrap() = if on { PlugState::On } else { PlugState::Off };
        }
        Ok(ActuationResult {
            ok: self.ack,
            raw: serde_json::json!({ "statusCode": if self.ack { 100 } else { 190 } }),
        })
    }
}

/// Channel double capturing sent alerts
pub struct RecordingChannel {
    pub configured: bool,
    pub accept: bool,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn accepting() -> Self {
        Self {
            configured: true,
            accept: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            configured: true,
            accept: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            accept: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, subject: &str, body: &str) -> Result<bool> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(self.accept)
    }
}

/// Channel handle the notifier can own while the test keeps the inner
/// recorder for assertions
pub struct SharedChannel(pub Arc<RecordingChannel>);

#[async_trait::async_trait]
impl AlertChannel for SharedChannel {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn is_configured(&self) -> bool {
        self.0.is_configured()
    }

    async fn send(&self, subject: &str, body: &str) -> Result<bool> {
        self.0.send(subject, body).await
    }
}

/// Fresh file-backed store in a temp dir; keep the dir alive for the test
pub fn temp_store() -> (TempDir, Arc<JsonStore>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonStore::open(&path.to_string_lossy()).unwrap();
    (dir, Arc::new(store))
}

/// Config with a plug configured and the default threshold bands
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.switchbot.plug_device_id = "plug-1".to_string();
    config.store.path = "unused-in-tests.json".to_string();
    config
}

//! Poll orchestration and fail-safe actuation
//!
//! One `run_poll` invocation is one cycle of the supervision state machine:
//! ensure the singleton status row, bypass telemetry entirely when the
//! failure counter already sits at the threshold, otherwise fetch the two
//! device snapshots concurrently, persist them, and evaluate the SoC bands
//! in descending severity. Every forced-on actuation goes through a single
//! helper that audits the action and routes the alert, downgrading to
//! `api_fatal_error` when the plug did not confirm the command.
//!
//! Cycles are serialized by an internal lock; the interval scheduler and the
//! HTTP trigger can never race each other on the failure counter.

use crate::config::Config;
use crate::ecoflow::PowerStationReader;
use crate::error::Result;
use crate::evaluator::{EvalInput, evaluate_fail_safe};
use crate::logging::get_logger;
use crate::notify::{AlertPayload, AlertSlug, Notifier};
use crate::soc::{SocStatus, classify};
use crate::store::{
    DeviceSource, DeviceStateRecord, LogAction, OperationLogEntry, StateStore, SystemStatus,
};
use crate::switchbot::{ActuationResult, PlugController, PlugState};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Audit target for the charger plug
pub const TARGET_PLUG: &str = "switchbot_plug_1";

/// Outcome of one poll cycle
#[derive(Debug, Clone, Serialize, Default)]
pub struct PollResult {
    pub ok: bool,
    pub fail_safe_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecoflow_soc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switchbot_state: Option<PlugState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_failure_count: Option<u32>,
}

struct ForceChargeOptions {
    reason: String,
    alert_slug: AlertSlug,
    current_soc: Option<u8>,
}

/// The supervision engine
pub struct Supervisor {
    config: Config,
    store: Arc<dyn StateStore>,
    station: Arc<dyn PowerStationReader>,
    plug: Arc<dyn PlugController>,
    notifier: Notifier,
    cycle_lock: tokio::sync::Mutex<()>,
    logger: crate::logging::StructuredLogger,
}

impl Supervisor {
    /// Wire the supervisor to its collaborators
    pub fn new(
        config: Config,
        store: Arc<dyn StateStore>,
        station: Arc<dyn PowerStationReader>,
        plug: Arc<dyn PlugController>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            store,
            station,
            plug,
            notifier,
            cycle_lock: tokio::sync::Mutex::new(()),
            logger: get_logger("supervisor"),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current singleton status row, if the store has one
    pub async fn system_status(&self) -> Result<Option<SystemStatus>> {
        self.store.system_status().await
    }

    /// Derived SoC freshness view; store unavailability classifies as unknown
    pub async fn soc_status(&self) -> SocStatus {
        match self.store.system_status().await {
            Ok(status) => classify(status.as_ref(), Utc::now()),
            Err(e) => {
                self.logger
                    .warn(&format!("Store unavailable for SoC status: {}", e));
                SocStatus::unavailable()
            }
        }
    }

    /// Run exactly one poll cycle.
    ///
    /// Returns `Err` only when the store cannot provide the singleton row at
    /// all; device and persistence failures inside the cycle are absorbed
    /// into the failure counter and reported through the `PollResult`.
    pub async fn run_poll(&self) -> Result<PollResult> {
        let _cycle = self.cycle_lock.lock().await;
        self.logger.debug("Starting poll cycle");

        let status = self.store.ensure_system_status().await?;
        let threshold = self.config.thresholds.poll_failure_threshold;
        let current_count = status.poll_failure_count;

        // A pipeline that has already failed to the threshold must not depend
        // on yet another fetch succeeding: force the safe state immediately.
        if current_count >= threshold {
            self.logger.warn(&format!(
                "Poll failure count {} >= threshold {}, forcing charger on",
                current_count, threshold
            ));
            self.force_charge_on(ForceChargeOptions {
                reason: format!("Poll failure count >= {} (fail-safe)", threshold),
                alert_slug: AlertSlug::PollFailure,
                current_soc: None,
            })
            .await;
            return Ok(PollResult {
                ok: false,
                fail_safe_triggered: true,
                reason: Some("poll_failure_threshold".to_string()),
                poll_failure_count: Some(current_count),
                ..PollResult::default()
            });
        }

        match self.poll_once().await {
            Ok(result) => {
                self.logger.debug("Poll cycle completed");
                Ok(result)
            }
            Err(err) => Ok(self.handle_cycle_error(current_count, err.to_string()).await),
        }
    }

    /// Plug state for this cycle; read failures degrade to `UNKNOWN` so a
    /// flaky plug API cannot abort the cycle (and `UNKNOWN` still passes the
    /// `!= ON` forced-on gate).
    async fn read_plug_state(&self, device_id: Option<&str>) -> PlugState {
        let Some(device_id) = device_id else {
            return PlugState::Unknown;
        };
        match self.plug.plug_state(device_id).await {
            Ok(state) => state,
            Err(e) => {
                self.logger
                    .warn(&format!("Plug state read failed, treating as UNKNOWN: {}", e));
                PlugState::Unknown
            }
        }
    }

    /// Fetch, persist, evaluate and (when needed) actuate for one cycle
    async fn poll_once(&self) -> Result<PollResult> {
        let plug_device = self.config.plug_device_id().map(str::to_string);

        let (station_res, plug_state) = tokio::join!(
            self.station.fetch_snapshot(),
            self.read_plug_state(plug_device.as_deref()),
        );
        let snapshot = station_res?;

        let now = Utc::now();
        let mut rows = vec![DeviceStateRecord {
            id: Uuid::new_v4(),
            collected_at: now,
            source: DeviceSource::Ecoflow,
            soc: Some(snapshot.soc),
            watts_in: Some(snapshot.watts_in),
            watts_out: Some(snapshot.watts_out),
            switchbot_state: None,
            raw_payload: snapshot.raw.clone(),
        }];
        if plug_device.is_some() {
            rows.push(DeviceStateRecord {
                id: Uuid::new_v4(),
                collected_at: now,
                source: DeviceSource::Switchbot,
                soc: None,
                watts_in: None,
                watts_out: None,
                switchbot_state: Some(plug_state),
                raw_payload: serde_json::json!({}),
            });
        }
        self.store.append_device_states(rows).await?;
        self.store.record_poll_success(now, snapshot.soc).await?;

        let t = &self.config.thresholds;
        let band = if plug_state == PlugState::On {
            // Already in the corrective state; no redundant actuation
            None
        } else if snapshot.soc <= t.soc_panic_min {
            Some((
                AlertSlug::LowSocPanic,
                format!("SoC {}% <= panic min {}%", snapshot.soc, t.soc_panic_min),
            ))
        } else {
            // The failure counter was reset by the successful persist above
            let verdict = evaluate_fail_safe(&EvalInput {
                poll_failure_count: 0,
                soc: snapshot.soc,
                plug_state,
                soc_critical_min: t.soc_critical_min,
                failure_threshold: t.poll_failure_threshold,
            });
            if verdict.trigger_fail_safe {
                Some((
                    AlertSlug::LowSocCritical,
                    format!(
                        "SoC {}% <= critical min {}%",
                        snapshot.soc, t.soc_critical_min
                    ),
                ))
            } else if snapshot.soc <= t.soc_caution_min {
                Some((
                    AlertSlug::LowSocCaution,
                    format!(
                        "SoC {}% <= caution min {}%",
                        snapshot.soc, t.soc_caution_min
                    ),
                ))
            } else {
                None
            }
        };

        if let Some((slug, reason)) = band {
            self.logger
                .warn(&format!("Fail-safe triggered ({}): {}", slug.as_str(), reason));
            self.force_charge_on(ForceChargeOptions {
                reason,
                alert_slug: slug,
                current_soc: Some(snapshot.soc),
            })
            .await;
            return Ok(PollResult {
                ok: true,
                fail_safe_triggered: true,
                reason: Some(slug.as_str().to_string()),
                ecoflow_soc: Some(snapshot.soc),
                switchbot_state: Some(plug_state),
                poll_failure_count: Some(0),
            });
        }

        Ok(PollResult {
            ok: true,
            fail_safe_triggered: false,
            reason: None,
            ecoflow_soc: Some(snapshot.soc),
            switchbot_state: Some(plug_state),
            poll_failure_count: Some(0),
        })
    }

    /// Tolerate a failed cycle up to the threshold, then escalate
    async fn handle_cycle_error(&self, previous_count: u32, message: String) -> PollResult {
        self.logger.warn(&format!("Poll cycle failed: {}", message));

        let new_count = match self.store.record_poll_failure().await {
            Ok(count) => count,
            Err(e) => {
                // The safety decision still uses the in-process count; a
                // store hiccup must not mask the escalation.
                self.logger
                    .error(&format!("Failed to persist failure counter: {}", e));
                previous_count.saturating_add(1)
            }
        };

        let threshold = self.config.thresholds.poll_failure_threshold;
        if new_count >= threshold {
            self.force_charge_on(ForceChargeOptions {
                reason: format!(
                    "Poll error and failure count >= {}: {}",
                    threshold, message
                ),
                alert_slug: AlertSlug::PollFailure,
                current_soc: None,
            })
            .await;
            return PollResult {
                ok: false,
                fail_safe_triggered: true,
                reason: Some("poll_error_then_threshold".to_string()),
                poll_failure_count: Some(new_count),
                ..PollResult::default()
            };
        }

        PollResult {
            ok: false,
            fail_safe_triggered: false,
            reason: Some(message),
            poll_failure_count: Some(new_count),
            ..PollResult::default()
        }
    }

    /// Force the charger plug on, audit the action, and alert.
    ///
    /// Skipped entirely when no plug device is configured. The audit row is
    /// written regardless of whether the plug confirmed the command, and an
    /// unconfirmed command reroutes the alert to `api_fatal_error`.
    async fn force_charge_on(&self, opts: ForceChargeOptions) {
        let Some(device_id) = self.config.plug_device_id() else {
            self.logger
                .debug("No plug device configured, skipping forced-on actuation");
            return;
        };

        let payload = AlertPayload {
            timestamp: Utc::now().to_rfc3339(),
            current_soc: opts.current_soc,
            device_id: Some(device_id.to_string()),
            action_taken: Some("plug.turn_on".to_string()),
            reason: Some(opts.reason.clone()),
        };

        let actuation = match self.plug.set_plug_state(device_id, true).await {
            Ok(result) => result,
            Err(e) => {
                self.logger
                    .error(&format!("Plug actuation call failed: {}", e));
                ActuationResult {
                    ok: false,
                    raw: serde_json::json!({ "error": e.to_string() }),
                }
            }
        };

        let entry = OperationLogEntry::new(
            "system",
            LogAction::ChargeOn,
            TARGET_PLUG,
            &opts.reason,
            true,
            serde_json::json!({ "api_ok": actuation.ok, "raw": actuation.raw }),
        );
        if let Err(e) = self.store.append_operation_log(entry).await {
            // Best effort: the actuation already happened, do not unwind it
            self.logger
                .error(&format!("Failed to audit CHARGE_ON action: {}", e));
        }

        let slug = if actuation.ok {
            opts.alert_slug
        } else {
            AlertSlug::ApiFatalError
        };
        if let Err(e) = self.notifier.send_alert(slug, &payload).await {
            self.logger.error(&format!("Alert dispatch failed: {}", e));
        }
    }
}

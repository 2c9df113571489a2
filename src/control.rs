//! Manual charge control guard
//!
//! Authorizes and validates a human-initiated charge on/off request before
//! the actuation path executes. Authentication is an injected capability
//! (`Authorizer`) so the policy here stays testable independent of the HTTP
//! auth mechanism.
//!
//! Charge-on is unconditionally allowed for an admin; it can never make
//! safety worse. Charge-off runs the full gauntlet: step-up evidence, an
//! override flag that demands a reason, the unknown/stale SoC bar that no
//! override can bypass, the unconditional below-critical reject, and the
//! override-with-reason path between critical and safe.

use crate::config::Config;
use crate::error::Result;
use crate::logging::get_logger;
use crate::soc::{SocStatus, classify};
use crate::store::{LogAction, OperationLogEntry, StateStore};
use crate::supervisor::TARGET_PLUG;
use crate::switchbot::{ActuationResult, PlugController};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Requested manual action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    ChargeOn,
    ChargeOff,
}

/// A manual control request, already parsed from the transport
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub override_low_soc: bool,
}

/// Caller roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

/// Injected authentication capability, kept apart from the HTTP layer
pub trait Authorizer: Send + Sync {
    /// Identify the caller, or `None` when unauthenticated
    fn authorize(&self) -> Option<Caller>;

    /// Whether the request carries valid PIN/re-auth evidence
    fn verify_step_up(&self) -> bool;
}

/// Typed rejection reasons; auth failures and safety-policy failures are
/// distinct so callers know whether a retry can ever succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReject {
    /// No authenticated caller
    Unauthorized,
    /// Caller is not an admin
    Forbidden,
    /// charge_off without valid PIN/re-auth evidence
    StepUpRequired,
    /// override_low_soc set without a reason
    OverrideRequiresReason,
    /// SoC is null or stale; no override can bypass this
    SocUnknown,
    /// SoC below the critical minimum; unconditional
    SocBelowCritical { soc: u8, min: u8 },
    /// SoC below the safe minimum without override evidence
    SocBelowSafe { soc: u8, min: u8 },
    /// No plug device configured
    PlugNotConfigured,
}

impl ControlReject {
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized => "Auth required".to_string(),
            Self::Forbidden => "Admin role required".to_string(),
            Self::StepUpRequired => "PIN or re-auth required for charge_off".to_string(),
            Self::OverrideRequiresReason => {
                "override_low_soc requires non-empty reason".to_string()
            }
            Self::SocUnknown => {
                "SoC data is unknown or stale (>5 min). charge_off not allowed. Ensure polling is healthy."
                    .to_string()
            }
            Self::SocBelowCritical { soc, min } => {
                format!("SoC {}% is below critical {}%. OFF not allowed.", soc, min)
            }
            Self::SocBelowSafe { soc, min } => format!(
                "SoC {}% is below safe minimum {}%. Use override_low_soc with reason.",
                soc, min
            ),
            Self::PlugNotConfigured => "switchbot.plug_device_id not set".to_string(),
        }
    }
}

/// Accepted request after actuation
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    pub action: LogAction,
    /// Whether the plug confirmed the command
    pub actuation_ok: bool,
}

/// Guard decision
#[derive(Debug, Clone)]
pub enum ControlVerdict {
    Accepted(ControlOutcome),
    Rejected(ControlReject),
}

/// The manual control guard
pub struct ControlGuard {
    config: Config,
    store: Arc<dyn StateStore>,
    plug: Arc<dyn PlugController>,
    logger: crate::logging::StructuredLogger,
}

impl ControlGuard {
    pub fn new(config: Config, store: Arc<dyn StateStore>, plug: Arc<dyn PlugController>) -> Self {
        Self {
            config,
            store,
            plug,
            logger: get_logger("control"),
        }
    }

    async fn current_soc_status(&self) -> SocStatus {
        match self.store.system_status().await {
            Ok(status) => classify(status.as_ref(), Utc::now()),
            Err(e) => {
                self.logger
                    .warn(&format!("Store unavailable for control check: {}", e));
                SocStatus::unavailable()
            }
        }
    }

    /// Apply the charge-off policy; `None` means the request passes
    fn check_off_policy(
        &self,
        soc_status: &SocStatus,
        override_low_soc: bool,
        reason: &str,
    ) -> Option<ControlReject> {
        if override_low_soc && reason.is_empty() {
            // Malformed request, checked before any SoC policy
            return Some(ControlReject::OverrideRequiresReason);
        }

        if soc_status.is_unknown {
            return Some(ControlReject::SocUnknown);
        }

        let soc = soc_status.last_success_soc?;
        let critical_min = self.config.thresholds.soc_critical_min;
        let safe_min = self.config.thresholds.soc_safe_min;

        if soc < critical_min {
            return Some(ControlReject::SocBelowCritical {
                soc,
                min: critical_min,
            });
        }

        if soc < safe_min && !(override_low_soc && !reason.is_empty()) {
            return Some(ControlReject::SocBelowSafe { soc, min: safe_min });
        }

        None
    }

    /// Validate and, when accepted, actuate and audit a manual request
    pub async fn handle(
        &self,
        auth: &dyn Authorizer,
        request: ControlRequest,
    ) -> Result<ControlVerdict> {
        let Some(caller) = auth.authorize() else {
            return Ok(ControlVerdict::Rejected(ControlReject::Unauthorized));
        };
        if caller.role != Role::Admin {
            return Ok(ControlVerdict::Rejected(ControlReject::Forbidden));
        }

        let want_on = request.action == ControlAction::ChargeOn;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .to_string();

        let soc_status = self.current_soc_status().await;

        if !want_on {
            if !auth.verify_step_up() {
                return Ok(ControlVerdict::Rejected(ControlReject::StepUpRequired));
            }
            if let Some(reject) =
                self.check_off_policy(&soc_status, request.override_low_soc, &reason)
            {
                self.logger.info(&format!(
                    "charge_off rejected for {}: {}",
                    caller.id,
                    reject.message()
                ));
                return Ok(ControlVerdict::Rejected(reject));
            }
        }

        let Some(device_id) = self.config.plug_device_id() else {
            return Ok(ControlVerdict::Rejected(ControlReject::PlugNotConfigured));
        };

        let actuation = match self.plug.set_plug_state(device_id, want_on).await {
            Ok(result) => result,
            Err(e) => {
                self.logger
                    .error(&format!("Manual plug actuation call failed: {}", e));
                ActuationResult {
                    ok: false,
                    raw: serde_json::json!({ "error": e.to_string() }),
                }
            }
        };

        let log_action = if want_on {
            LogAction::ChargeOn
        } else {
            LogAction::ChargeOff
        };
        let mut details = serde_json::json!({
            "api_ok": actuation.ok,
            "raw": actuation.raw,
        });
        if !want_on {
            details["override_low_soc"] = serde_json::json!(request.override_low_soc);
            details["stale_data"] = serde_json::json!(soc_status.is_stale);
            if request.override_low_soc && !reason.is_empty() {
                details["override_reason"] = serde_json::json!(reason);
            }
        }

        let default_reason = if want_on {
            "Manual charge ON"
        } else {
            "Manual charge OFF"
        };
        let entry = OperationLogEntry::new(
            &caller.id,
            log_action,
            TARGET_PLUG,
            if reason.is_empty() {
                default_reason
            } else {
                &reason
            },
            false,
            details,
        );
        // Audited regardless of whether the plug confirmed the command
        if let Err(e) = self.store.append_operation_log(entry).await {
            self.logger
                .error(&format!("Failed to audit manual action: {}", e));
        }

        self.logger.info(&format!(
            "{} by {} (actuation_ok={})",
            log_action.as_str(),
            caller.id,
            actuation.ok
        ));

        Ok(ControlVerdict::Accepted(ControlOutcome {
            action: log_action,
            actuation_ok: actuation.ok,
        }))
    }
}

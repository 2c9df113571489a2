//! Fail-safe trigger evaluation
//!
//! Pure decision core for the poll cycle: should the charger be forced on?
//! No I/O, no side effects; extracted so the decision can be unit tested
//! without device or store doubles.
//!
//! The failure-count check takes priority over the SoC check: a broken
//! telemetry pipeline is itself a safety hazard independent of the last-known
//! SoC value. A plug already ON with critically low SoC does not re-trigger.

use crate::switchbot::PlugState;
use serde::Serialize;

/// Inputs to one fail-safe evaluation
#[derive(Debug, Clone)]
pub struct EvalInput {
    /// Consecutive failed poll cycles
    pub poll_failure_count: u32,
    /// Current state of charge, percent
    pub soc: u8,
    /// Last observed plug switch state
    pub plug_state: PlugState,
    /// SoC at or below which the fail-safe fires
    pub soc_critical_min: u8,
    /// Failure count at which the fail-safe fires
    pub failure_threshold: u32,
}

/// Why the fail-safe fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailSafeReason {
    PollFailureThreshold,
    LowSocCritical,
}

impl FailSafeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PollFailureThreshold => "poll_failure_threshold",
            Self::LowSocCritical => "low_soc_critical",
        }
    }
}

/// Outcome of one fail-safe evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalResult {
    pub trigger_fail_safe: bool,
    pub reason: Option<FailSafeReason>,
}

impl EvalResult {
    fn trigger(reason: FailSafeReason) -> Self {
        Self {
            trigger_fail_safe: true,
            reason: Some(reason),
        }
    }

    fn no_trigger() -> Self {
        Self {
            trigger_fail_safe: false,
            reason: None,
        }
    }
}

/// Evaluate whether the fail-safe must force the charger on. First match wins.
pub fn evaluate_fail_safe(input: &EvalInput) -> EvalResult {
    if input.poll_failure_count >= input.failure_threshold {
        return EvalResult::trigger(FailSafeReason::PollFailureThreshold);
    }
    if input.soc <= input.soc_critical_min && input.plug_state != PlugState::On {
        return EvalResult::trigger(FailSafeReason::LowSocCritical);
    }
    EvalResult::no_trigger()
}

//! SoC status classification
//!
//! Derives "known / unknown / stale" from the persisted `SystemStatus`.
//! Telemetry older than five minutes (strict greater-than; exactly 5:00 is
//! still fresh) is stale, and a stale or absent SoC is unknown. An
//! unavailable store classifies as unknown+stale, which forbids any manual
//! charge-off downstream. Recomputed on every call, never cached.

use crate::store::SystemStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Telemetry older than this is stale
pub const STALE_AFTER_MINUTES: i64 = 5;

/// Derived, never-persisted view of SoC freshness
#[derive(Debug, Clone, Serialize)]
pub struct SocStatus {
    pub last_success_soc: Option<u8>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub is_unknown: bool,
}

impl SocStatus {
    /// Safe default when the state store cannot be read
    pub fn unavailable() -> Self {
        Self {
            last_success_soc: None,
            last_poll_at: None,
            is_stale: true,
            is_unknown: true,
        }
    }
}

/// Classify the current SoC knowledge from a status snapshot.
///
/// `status = None` means the store was unavailable or the singleton row does
/// not exist yet; both classify as unknown.
pub fn classify(status: Option<&SystemStatus>, now: DateTime<Utc>) -> SocStatus {
    let Some(status) = status else {
        return SocStatus::unavailable();
    };

    let is_stale = match status.last_poll_at {
        Some(at) => now - at > Duration::minutes(STALE_AFTER_MINUTES),
        None => true,
    };
    let is_unknown = status.last_success_soc.is_none() || is_stale;

    SocStatus {
        last_success_soc: status.last_success_soc,
        last_poll_at: status.last_poll_at,
        is_stale,
        is_unknown,
    }
}

//! # Soteria - fail-safe supervisor for battery-powered charging
//!
//! Soteria watches an EcoFlow power station and the SwitchBot plug feeding
//! its charger. Every poll cycle it records the station's state of charge
//! and the plug's switch state, and forces the charger on before the battery
//! can deplete below a safety floor - including when telemetry itself has
//! been broken for too long. Every actuation and every suppressed alert is
//! written to an append-only audit log.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with startup validation
//! - `logging`: structured logging and tracing
//! - `store`: durable state, telemetry history, and the audit log
//! - `soc`: SoC freshness classification (known/unknown/stale)
//! - `evaluator`: pure fail-safe trigger decision
//! - `supervisor`: the poll cycle state machine and forced-on actuation
//! - `control`: manual charge on/off guard with injected auth capability
//! - `notify`: cooldown-gated alert dispatch over independent channels
//! - `ecoflow` / `switchbot`: vendor REST collaborators
//! - `web`: HTTP server and REST API

pub mod config;
pub mod control;
pub mod ecoflow;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod notify;
pub mod soc;
pub mod store;
pub mod supervisor;
pub mod switchbot;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SoteriaError};
pub use supervisor::{PollResult, Supervisor};

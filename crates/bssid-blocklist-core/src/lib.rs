//! bssid-blocklist-core: connection-failure scoring and BSSID blocklisting
//!
//! This crate decides which access-point radios (BSSIDs) a Wi-Fi client should
//! temporarily stay away from, based on connection failures, success events,
//! signal improvements and explicit framework requests.
//!
//! # Architecture
//!
//! ```text
//! failure / success / scan events
//!              ↓
//!     BssidBlocklistMonitor ──→ ScoreCard (streaks, connection times)
//!              ↓          └───→ LastResortWatchdog (veto)
//!      live blocklist ───────→ FirmwareRoaming (blocked BSSID list)
//! ```
//!
//! # Modules
//!
//! - `failure_reason`: Failure reasons, thresholds and policy flags
//! - `monitor`: The blocklist engine
//! - `shared`: Mutex-guarded handle for multi-threaded hosts
//! - `ports`: Clock, score card, firmware and watchdog traits
//! - `backoff`: Exponential block durations
//! - `scan`: Scan results and band classification
//! - `status`, `history`: Per-BSSID state and the bounded event log
//! - `replay`: JSON event traces and a deterministic replay driver
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod failure_reason;
pub mod history;
pub mod logging;
pub mod monitor;
pub mod ports;
pub mod replay;
pub mod scan;
pub mod shared;
pub mod status;

pub use error::{Error, Result};
pub use failure_reason::FailureReason;
pub use monitor::{BlocklistSnapshot, BssidBlocklistMonitor};
pub use shared::SharedBlocklistMonitor;

/// Version of the bssid-blocklist-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

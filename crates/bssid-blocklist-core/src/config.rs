//! Configuration management for bssid-blocklist
//!
//! Handles loading and validation of blocklist TOML configuration files.
//! Configuration is read once when the monitor is built; it is not reloaded
//! while the monitor is running.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::failure_reason::{FailureReason, ReasonTable};
use crate::logging::LogConfig;
use crate::scan::Band;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Blocklist policy
    #[serde(default)]
    pub blocklist: BlocklistConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ReadFailed(path.display().to_string(), e.to_string())
            }
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.blocklist.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeFailed(e.to_string()))?)
    }
}

/// Blocklist policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistConfig {
    /// Base block duration before exponential backoff.
    pub base_block_duration_ms: i64,
    /// Base block duration for connected-score framework disconnects.
    pub connected_score_base_block_duration_ms: i64,
    /// Streak value at which the backoff multiplier stops growing.
    pub failure_streak_cap: u32,
    /// Abnormal disconnects only count if they happen this soon after connecting.
    pub abnormal_disconnect_time_window_ms: i64,
    /// Minimum gap between connections before the abnormal-disconnect and
    /// connected-score streaks are cleared by a connection success.
    pub abnormal_disconnect_reset_time_ms: i64,
    /// RSSI gain (dB) over the block-time RSSI needed for an early unblock.
    pub min_rssi_diff_to_unblock: i32,
    /// Number of block/unblock events kept for diagnostics.
    pub history_capacity: usize,
    /// Per-reason disable thresholds.
    pub thresholds: FailureThresholds,
    /// Per-band "sufficient" RSSI levels.
    pub rssi: RssiThresholds,
}

pub const DEFAULT_BASE_BLOCK_DURATION_MS: i64 = 5 * 60 * 1000;
pub const DEFAULT_CONNECTED_SCORE_BASE_BLOCK_DURATION_MS: i64 = 30 * 1000;
pub const DEFAULT_FAILURE_STREAK_CAP: u32 = 7;
pub const DEFAULT_ABNORMAL_DISCONNECT_TIME_WINDOW_MS: i64 = 30 * 1000;
pub const DEFAULT_ABNORMAL_DISCONNECT_RESET_TIME_MS: i64 = 3 * 60 * 60 * 1000;
pub const DEFAULT_MIN_RSSI_DIFF_TO_UNBLOCK: i32 = 5;
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Largest accepted streak cap; 2^30 times the base duration is already
/// centuries for any sane base.
pub const MAX_FAILURE_STREAK_CAP: u32 = 30;

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            base_block_duration_ms: DEFAULT_BASE_BLOCK_DURATION_MS,
            connected_score_base_block_duration_ms: DEFAULT_CONNECTED_SCORE_BASE_BLOCK_DURATION_MS,
            failure_streak_cap: DEFAULT_FAILURE_STREAK_CAP,
            abnormal_disconnect_time_window_ms: DEFAULT_ABNORMAL_DISCONNECT_TIME_WINDOW_MS,
            abnormal_disconnect_reset_time_ms: DEFAULT_ABNORMAL_DISCONNECT_RESET_TIME_MS,
            min_rssi_diff_to_unblock: DEFAULT_MIN_RSSI_DIFF_TO_UNBLOCK,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            thresholds: FailureThresholds::default(),
            rssi: RssiThresholds::default(),
        }
    }
}

impl BlocklistConfig {
    /// Check that every knob is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("base_block_duration_ms", self.base_block_duration_ms),
            (
                "connected_score_base_block_duration_ms",
                self.connected_score_base_block_duration_ms,
            ),
            (
                "abnormal_disconnect_time_window_ms",
                self.abnormal_disconnect_time_window_ms,
            ),
            (
                "abnormal_disconnect_reset_time_ms",
                self.abnormal_disconnect_reset_time_ms,
            ),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be > 0 (got {value})"
                )));
            }
        }
        if self.failure_streak_cap > MAX_FAILURE_STREAK_CAP {
            return Err(ConfigError::ValidationError(format!(
                "failure_streak_cap must be <= {MAX_FAILURE_STREAK_CAP} (got {})",
                self.failure_streak_cap
            )));
        }
        if self.min_rssi_diff_to_unblock < 0 {
            return Err(ConfigError::ValidationError(format!(
                "min_rssi_diff_to_unblock must be >= 0 (got {})",
                self.min_rssi_diff_to_unblock
            )));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "history_capacity must be >= 1".to_string(),
            ));
        }
        for (reason, threshold) in self.thresholds.to_table().iter() {
            if threshold == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "threshold for {reason} must be >= 1"
                )));
            }
        }
        Ok(())
    }
}

/// Disable thresholds, one field per [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureThresholds {
    pub ap_unable_to_handle_new_sta: u32,
    pub network_validation_failure: u32,
    pub wrong_password: u32,
    pub eap_failure: u32,
    pub association_rejection: u32,
    pub association_timeout: u32,
    pub authentication_failure: u32,
    pub dhcp_failure: u32,
    pub abnormal_disconnect: u32,
    pub framework_disconnect_mbo_oce: u32,
    pub framework_disconnect_fast_reconnect: u32,
    pub framework_disconnect_connected_score: u32,
}

impl Default for FailureThresholds {
    fn default() -> Self {
        let mut thresholds = Self {
            ap_unable_to_handle_new_sta: 0,
            network_validation_failure: 0,
            wrong_password: 0,
            eap_failure: 0,
            association_rejection: 0,
            association_timeout: 0,
            authentication_failure: 0,
            dhcp_failure: 0,
            abnormal_disconnect: 0,
            framework_disconnect_mbo_oce: 0,
            framework_disconnect_fast_reconnect: 0,
            framework_disconnect_connected_score: 0,
        };
        for reason in FailureReason::ALL {
            *thresholds.slot_mut(reason) = reason.default_threshold();
        }
        thresholds
    }
}

impl FailureThresholds {
    /// Threshold for one reason.
    #[must_use]
    pub fn get(&self, reason: FailureReason) -> u32 {
        match reason {
            FailureReason::ApUnableToHandleNewSta => self.ap_unable_to_handle_new_sta,
            FailureReason::NetworkValidationFailure => self.network_validation_failure,
            FailureReason::WrongPassword => self.wrong_password,
            FailureReason::EapFailure => self.eap_failure,
            FailureReason::AssociationRejection => self.association_rejection,
            FailureReason::AssociationTimeout => self.association_timeout,
            FailureReason::AuthenticationFailure => self.authentication_failure,
            FailureReason::DhcpFailure => self.dhcp_failure,
            FailureReason::AbnormalDisconnect => self.abnormal_disconnect,
            FailureReason::FrameworkDisconnectMboOce => self.framework_disconnect_mbo_oce,
            FailureReason::FrameworkDisconnectFastReconnect => {
                self.framework_disconnect_fast_reconnect
            }
            FailureReason::FrameworkDisconnectConnectedScore => {
                self.framework_disconnect_connected_score
            }
        }
    }

    /// Override the threshold for one reason.
    #[must_use]
    pub fn with(mut self, reason: FailureReason, threshold: u32) -> Self {
        *self.slot_mut(reason) = threshold;
        self
    }

    fn slot_mut(&mut self, reason: FailureReason) -> &mut u32 {
        match reason {
            FailureReason::ApUnableToHandleNewSta => &mut self.ap_unable_to_handle_new_sta,
            FailureReason::NetworkValidationFailure => &mut self.network_validation_failure,
            FailureReason::WrongPassword => &mut self.wrong_password,
            FailureReason::EapFailure => &mut self.eap_failure,
            FailureReason::AssociationRejection => &mut self.association_rejection,
            FailureReason::AssociationTimeout => &mut self.association_timeout,
            FailureReason::AuthenticationFailure => &mut self.authentication_failure,
            FailureReason::DhcpFailure => &mut self.dhcp_failure,
            FailureReason::AbnormalDisconnect => &mut self.abnormal_disconnect,
            FailureReason::FrameworkDisconnectMboOce => &mut self.framework_disconnect_mbo_oce,
            FailureReason::FrameworkDisconnectFastReconnect => {
                &mut self.framework_disconnect_fast_reconnect
            }
            FailureReason::FrameworkDisconnectConnectedScore => {
                &mut self.framework_disconnect_connected_score
            }
        }
    }

    /// Flatten into an array-indexed lookup table.
    #[must_use]
    pub fn to_table(&self) -> ReasonTable<u32> {
        ReasonTable::from_fn(|reason| self.get(reason))
    }
}

/// Per-band RSSI (dBm) at which a link is considered good enough to stay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssiThresholds {
    pub sufficient_2g: i32,
    pub sufficient_5g: i32,
    pub sufficient_6g: i32,
}

impl Default for RssiThresholds {
    fn default() -> Self {
        Self {
            sufficient_2g: -73,
            sufficient_5g: -70,
            sufficient_6g: -70,
        }
    }
}

impl RssiThresholds {
    #[must_use]
    pub fn sufficient_rssi(&self, band: Band) -> i32 {
        match band {
            Band::Band24Ghz => self.sufficient_2g,
            Band::Band5Ghz => self.sufficient_5g,
            Band::Band6Ghz => self.sufficient_6g,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

//! Per-BSSID blocklist state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::failure_reason::{FailureReason, ReasonTable};
use crate::history::format_time_ms;

/// Everything the monitor tracks about one access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BssidStatus {
    pub bssid: String,
    pub ssid: String,
    /// Whether the BSSID is in the live blocklist. Cleared lazily on expiry.
    pub is_blocked: bool,
    pub block_reason: FailureReason,
    pub block_start_time_ms: i64,
    pub block_end_time_ms: i64,
    pub rssi_at_block_time: i32,
    /// Failures counted since the last reset for each reason.
    pub failure_count: ReasonTable<u32>,
}

impl BssidStatus {
    #[must_use]
    pub fn new(bssid: impl Into<String>, ssid: impl Into<String>) -> Self {
        Self {
            bssid: bssid.into(),
            ssid: ssid.into(),
            is_blocked: false,
            block_reason: FailureReason::ApUnableToHandleNewSta,
            block_start_time_ms: 0,
            block_end_time_ms: 0,
            rssi_at_block_time: 0,
            failure_count: ReasonTable::default(),
        }
    }

    /// Count one failure, saturating at `limit`. Returns the new count.
    pub fn increment_failure_count(&mut self, reason: FailureReason, limit: u32) -> u32 {
        let count = &mut self.failure_count[reason];
        if *count < limit {
            *count += 1;
        }
        *count
    }

    pub fn reset_failure_count(&mut self, reason: FailureReason) {
        self.failure_count[reason] = 0;
    }

    /// Mark the BSSID blocked until `end_ms`.
    pub fn set_blocked(&mut self, reason: FailureReason, start_ms: i64, end_ms: i64, rssi: i32) {
        self.is_blocked = true;
        self.block_reason = reason;
        self.block_start_time_ms = start_ms;
        self.block_end_time_ms = end_ms;
        self.rssi_at_block_time = rssi;
    }

    /// A block is over once its end time is strictly in the past.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.block_end_time_ms < now_ms
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count.iter().any(|(_, count)| count > 0)
    }
}

impl fmt::Display for BssidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bssid={} ssid={}", self.bssid, self.ssid)?;
        if self.is_blocked {
            write!(
                f,
                " blocked reason={} start={} end={} rssi={}",
                self.block_reason,
                format_time_ms(self.block_start_time_ms),
                format_time_ms(self.block_end_time_ms),
                self.rssi_at_block_time
            )?;
        }
        let counts: Vec<String> = self
            .failure_count
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect();
        if !counts.is_empty() {
            write!(f, " failures=[{}]", counts.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_count_saturates() {
        let mut status = BssidStatus::new("aa:bb:cc:dd:ee:ff", "\"home\"");
        for _ in 0..10 {
            status.increment_failure_count(FailureReason::DhcpFailure, 7);
        }
        assert_eq!(status.failure_count[FailureReason::DhcpFailure], 7);
        assert!(status.has_failures());
        status.reset_failure_count(FailureReason::DhcpFailure);
        assert!(!status.has_failures());
    }

    #[test]
    fn expiry_is_strict() {
        let mut status = BssidStatus::new("aa:bb:cc:dd:ee:ff", "\"home\"");
        status.set_blocked(FailureReason::WrongPassword, 0, 1_000, -60);
        assert!(!status.is_expired(999));
        assert!(!status.is_expired(1_000));
        assert!(status.is_expired(1_001));
    }

    #[test]
    fn display_lists_nonzero_failures() {
        let mut status = BssidStatus::new("aa:bb:cc:dd:ee:ff", "\"home\"");
        status.increment_failure_count(FailureReason::AssociationTimeout, 3);
        let text = status.to_string();
        assert!(text.contains("failures=[REASON_ASSOCIATION_TIMEOUT=1]"));
        assert!(!text.contains("blocked"));
    }
}

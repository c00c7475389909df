//! Bounded history of block and unblock events, kept for diagnostics dumps.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::failure_reason::FailureReason;

/// Why a BSSID left the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnblockCause {
    Expired,
    ValidationSuccess,
    RssiImproved,
    Cleared,
    NetworkRemoved,
}

impl fmt::Display for UnblockCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Expired => "expired",
            Self::ValidationSuccess => "validation success",
            Self::RssiImproved => "rssi improved",
            Self::Cleared => "cleared",
            Self::NetworkRemoved => "network removed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    Blocked,
    Unblocked { cause: UnblockCause },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub bssid: String,
    pub ssid: String,
    pub reason: FailureReason,
    pub event: HistoryEvent,
    pub time_ms: i64,
    pub block_end_time_ms: i64,
    pub rssi: i32,
}

/// Render a wall-clock millisecond timestamp the way dumps show it.
pub(crate) fn format_time_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms).map_or_else(
        || format!("{ms}ms"),
        |t| t.format("%m-%d %H:%M:%S%.3f").to_string(),
    )
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bssid={} ssid={} reason={} rssi={}",
            format_time_ms(self.time_ms),
            self.bssid,
            self.ssid,
            self.reason,
            self.rssi
        )?;
        match self.event {
            HistoryEvent::Blocked => {
                write!(f, " blocked until {}", format_time_ms(self.block_end_time_ms))
            }
            HistoryEvent::Unblocked { cause } => write!(f, " unblocked ({cause})"),
        }
    }
}

/// FIFO ring of the most recent history entries.
#[derive(Debug, Clone)]
pub struct StatusHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl StatusHistory {
    /// A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time_ms: i64) -> HistoryEntry {
        HistoryEntry {
            bssid: "aa:bb:cc:dd:ee:ff".to_string(),
            ssid: "\"home\"".to_string(),
            reason: FailureReason::DhcpFailure,
            event: HistoryEvent::Blocked,
            time_ms,
            block_end_time_ms: time_ms + 300_000,
            rssi: -80,
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = StatusHistory::new(3);
        for t in 0..5 {
            history.push(entry(t));
        }
        assert_eq!(history.len(), 3);
        let times: Vec<_> = history.iter().map(|e| e.time_ms).collect();
        assert_eq!(times, vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut history = StatusHistory::new(0);
        assert!(history.is_empty());
        history.push(entry(1));
        history.push(entry(2));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.iter().next().map(|e| e.time_ms), Some(2));
    }

    #[test]
    fn display_mentions_event() {
        let blocked = entry(0).to_string();
        assert!(blocked.starts_with("01-01 00:00:00.000"));
        assert!(blocked.contains("reason=REASON_DHCP_FAILURE"));
        assert!(blocked.contains("blocked until 01-01 00:05:00.000"));

        let mut unblocked = entry(0);
        unblocked.event = HistoryEvent::Unblocked {
            cause: UnblockCause::RssiImproved,
        };
        assert!(unblocked.to_string().ends_with("unblocked (rssi improved)"));
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let json = serde_json::to_value(HistoryEvent::Unblocked {
            cause: UnblockCause::Expired,
        })
        .unwrap();
        assert_eq!(json["kind"], "unblocked");
        assert_eq!(json["cause"], "expired");
    }
}

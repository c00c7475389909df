//! The BSSID blocklist engine.
//!
//! [`BssidBlocklistMonitor`] turns connection failures into temporary blocks
//! on individual access points. A BSSID is blocked once it fails often enough
//! for one reason (or immediately, if it was already blocked for that reason
//! before), for a duration that doubles with every consecutive block. Blocks
//! end when they expire, when the network validates, when the BSSID shows up
//! in a scan with a much better signal, or when the framework clears them.
//!
//! Expiry is lazy: nothing happens until one of the `update_and_get_*`
//! queries (or another operation that needs the live set) runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backoff;
use crate::config::BlocklistConfig;
use crate::failure_reason::{FailureReason, ReasonTable};
use crate::history::{HistoryEntry, HistoryEvent, StatusHistory, UnblockCause, format_time_ms};
use crate::ports::{
    Clock, FirmwareRoaming, InMemoryScoreCard, LastResortWatchdog, NeverIgnoreWatchdog,
    NoFirmwareRoaming, ScoreCard, SystemClock,
};
use crate::scan::ScanDetail;
use crate::status::BssidStatus;

/// MAC address reported when the real one is hidden.
pub const DEFAULT_MAC_ADDRESS: &str = "02:00:00:00:00:00";

/// SSID reported when the network name is not known.
pub const UNKNOWN_SSID: &str = "<unknown ssid>";

/// Whether a `(bssid, ssid)` pair names a real access point.
#[must_use]
pub fn is_valid_identity(bssid: &str, ssid: &str) -> bool {
    !bssid.is_empty() && !ssid.is_empty() && ssid != UNKNOWN_SSID && bssid != DEFAULT_MAC_ADDRESS
}

fn record_unblock(
    history: &mut StatusHistory,
    status: &BssidStatus,
    cause: UnblockCause,
    now_ms: i64,
) {
    history.push(HistoryEntry {
        bssid: status.bssid.clone(),
        ssid: status.ssid.clone(),
        reason: status.block_reason,
        event: HistoryEvent::Unblocked { cause },
        time_ms: now_ms,
        block_end_time_ms: status.block_end_time_ms,
        rssi: status.rssi_at_block_time,
    });
    info!(
        bssid = %status.bssid,
        ssid = %status.ssid,
        reason = %status.block_reason,
        cause = %cause,
        "BSSID unblocked"
    );
}

/// Tracks failures per BSSID and decides which BSSIDs are blocked.
pub struct BssidBlocklistMonitor {
    config: BlocklistConfig,
    thresholds: ReasonTable<u32>,
    clock: Arc<dyn Clock>,
    score_card: Arc<dyn ScoreCard>,
    firmware: Arc<dyn FirmwareRoaming>,
    watchdog: Arc<dyn LastResortWatchdog>,
    statuses: BTreeMap<String, BssidStatus>,
    history: StatusHistory,
}

impl fmt::Debug for BssidBlocklistMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BssidBlocklistMonitor")
            .field("config", &self.config)
            .field("statuses", &self.statuses)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl BssidBlocklistMonitor {
    #[must_use]
    pub fn new(
        config: BlocklistConfig,
        clock: Arc<dyn Clock>,
        score_card: Arc<dyn ScoreCard>,
        firmware: Arc<dyn FirmwareRoaming>,
        watchdog: Arc<dyn LastResortWatchdog>,
    ) -> Self {
        let thresholds = config.thresholds.to_table();
        let history = StatusHistory::new(config.history_capacity);
        Self {
            config,
            thresholds,
            clock,
            score_card,
            firmware,
            watchdog,
            statuses: BTreeMap::new(),
            history,
        }
    }

    /// Monitor with the system clock, an in-memory score card, no firmware
    /// roaming and no watchdog vetoes.
    #[must_use]
    pub fn standalone(config: BlocklistConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemClock),
            Arc::new(InMemoryScoreCard::new()),
            Arc::new(NoFirmwareRoaming),
            Arc::new(NeverIgnoreWatchdog),
        )
    }

    #[must_use]
    pub fn config(&self) -> &BlocklistConfig {
        &self.config
    }

    /// Failures of `reason` needed before a BSSID without a streak is blocked.
    #[must_use]
    pub fn failure_threshold(&self, reason: FailureReason) -> u32 {
        self.thresholds[reason]
    }

    /// Block duration before backoff for `reason`.
    #[must_use]
    pub fn base_block_duration_ms(&self, reason: FailureReason) -> i64 {
        if reason == FailureReason::FrameworkDisconnectConnectedScore {
            self.config.connected_score_base_block_duration_ms
        } else {
            self.config.base_block_duration_ms
        }
    }

    /// Tracked status for a BSSID, blocked or not.
    #[must_use]
    pub fn status(&self, bssid: &str) -> Option<&BssidStatus> {
        self.statuses.get(bssid)
    }

    fn now_ms(&self) -> i64 {
        self.clock.wall_clock_millis()
    }

    /// A BSSID reused under a new SSID starts over.
    fn drop_stale_status(&mut self, bssid: &str, ssid: &str) {
        if let Some(status) = self.statuses.get(bssid) {
            if status.ssid != ssid {
                debug!(
                    bssid,
                    old_ssid = %status.ssid,
                    ssid,
                    "SSID changed for BSSID, dropping stale status"
                );
                self.statuses.remove(bssid);
            }
        }
    }

    fn tracked_status_mut(&mut self, bssid: &str, ssid: &str) -> Option<&mut BssidStatus> {
        self.statuses
            .get_mut(bssid)
            .filter(|status| status.ssid == ssid)
    }

    fn add_to_blocklist(
        &mut self,
        bssid: &str,
        ssid: &str,
        reason: FailureReason,
        rssi: i32,
        now_ms: i64,
        duration_ms: i64,
    ) {
        let end_ms = now_ms.saturating_add(duration_ms);
        self.statuses
            .entry(bssid.to_string())
            .or_insert_with(|| BssidStatus::new(bssid, ssid))
            .set_blocked(reason, now_ms, end_ms, rssi);
        self.history.push(HistoryEntry {
            bssid: bssid.to_string(),
            ssid: ssid.to_string(),
            reason,
            event: HistoryEvent::Blocked,
            time_ms: now_ms,
            block_end_time_ms: end_ms,
            rssi,
        });
        info!(
            bssid,
            ssid,
            reason = %reason,
            duration_ms,
            rssi,
            "BSSID blocked"
        );
    }

    /// Take expired blocks out of the live set. Statuses that still carry
    /// failure counts are kept; empty ones are dropped.
    fn purge_expired(&mut self, now_ms: i64) {
        let history = &mut self.history;
        self.statuses.retain(|_, status| {
            if status.is_blocked && status.is_expired(now_ms) {
                status.is_blocked = false;
                record_unblock(history, status, UnblockCause::Expired, now_ms);
            }
            status.is_blocked || status.has_failures()
        });
    }

    fn live_statuses(&self) -> impl Iterator<Item = &BssidStatus> {
        self.statuses.values().filter(|status| status.is_blocked)
    }

    /// Record a connection failure. Returns `true` if the BSSID was blocked
    /// because of it.
    pub fn handle_bssid_connection_failure(
        &mut self,
        bssid: &str,
        ssid: &str,
        reason: FailureReason,
        rssi: i32,
    ) -> bool {
        if !is_valid_identity(bssid, ssid) {
            debug!(bssid, ssid, reason = %reason, "Ignoring failure for invalid identity");
            return false;
        }
        let now_ms = self.now_ms();

        if reason == FailureReason::AbnormalDisconnect {
            let connected_at_ms = self.score_card.connection_timestamp_ms(ssid, bssid);
            let since_connection_ms = now_ms.saturating_sub(connected_at_ms);
            if since_connection_ms > self.config.abnormal_disconnect_time_window_ms {
                debug!(
                    bssid,
                    ssid,
                    since_connection_ms,
                    "Ignoring abnormal disconnect outside the connection window"
                );
                return false;
            }
        }

        self.drop_stale_status(bssid, ssid);

        if reason.is_watchdog_monitored() && self.watchdog.should_ignore_bssid_update(bssid) {
            debug!(bssid, ssid, reason = %reason, "Watchdog vetoed blocklist update");
            return false;
        }

        let threshold = self.thresholds[reason];
        let limit = threshold.max(self.config.failure_streak_cap);
        let failure_count = self
            .statuses
            .entry(bssid.to_string())
            .or_insert_with(|| BssidStatus::new(bssid, ssid))
            .increment_failure_count(reason, limit);

        let streak = self.score_card.blocklist_streak(ssid, bssid, reason);
        if streak == 0 && failure_count < threshold {
            debug!(
                bssid,
                ssid,
                reason = %reason,
                failure_count,
                threshold,
                "Connection failure counted"
            );
            return false;
        }

        let duration_ms = backoff::block_duration_ms(
            self.base_block_duration_ms(reason),
            streak,
            self.config.failure_streak_cap,
        );
        self.add_to_blocklist(bssid, ssid, reason, rssi, now_ms, duration_ms);
        self.score_card
            .increment_blocklist_streak(ssid, bssid, reason);
        true
    }

    /// L2 connection success: clears the L2 streaks and counters, and the
    /// slow-reset ones when the previous connection is old enough.
    pub fn handle_bssid_connection_success(&mut self, bssid: &str, ssid: &str) {
        if !is_valid_identity(bssid, ssid) {
            debug!(bssid, ssid, "Ignoring connection success for invalid identity");
            return;
        }
        let now_ms = self.now_ms();

        for reason in FailureReason::L2_SUCCESS_RESET {
            self.score_card.reset_blocklist_streak(ssid, bssid, reason);
        }
        let previous_ms = self
            .score_card
            .set_connection_timestamp_ms(ssid, bssid, now_ms);
        let slow_reset =
            now_ms.saturating_sub(previous_ms) >= self.config.abnormal_disconnect_reset_time_ms;
        if slow_reset {
            for reason in FailureReason::SLOW_RESET {
                self.score_card.reset_blocklist_streak(ssid, bssid, reason);
            }
        }

        if let Some(status) = self.tracked_status_mut(bssid, ssid) {
            for reason in FailureReason::L2_SUCCESS_RESET {
                status.reset_failure_count(reason);
            }
            if slow_reset {
                for reason in FailureReason::SLOW_RESET {
                    status.reset_failure_count(reason);
                }
            }
        }
        debug!(bssid, ssid, slow_reset, "Connection success");
    }

    /// L3 success: only the DHCP streak and counter are cleared.
    pub fn handle_dhcp_provisioning_success(&mut self, bssid: &str, ssid: &str) {
        if !is_valid_identity(bssid, ssid) {
            return;
        }
        self.score_card
            .reset_blocklist_streak(ssid, bssid, FailureReason::DhcpFailure);
        if let Some(status) = self.tracked_status_mut(bssid, ssid) {
            status.reset_failure_count(FailureReason::DhcpFailure);
        }
        debug!(bssid, ssid, "DHCP provisioning success");
    }

    /// Internet access validated: clears the validation streak and counter and
    /// takes the BSSID out of the blocklist right away.
    pub fn handle_network_validation_success(&mut self, bssid: &str, ssid: &str) {
        if !is_valid_identity(bssid, ssid) {
            return;
        }
        let now_ms = self.now_ms();
        self.purge_expired(now_ms);
        self.score_card
            .reset_blocklist_streak(ssid, bssid, FailureReason::NetworkValidationFailure);
        if let Some(status) = self
            .statuses
            .get_mut(bssid)
            .filter(|status| status.ssid == ssid)
        {
            status.reset_failure_count(FailureReason::NetworkValidationFailure);
            if status.is_blocked {
                status.is_blocked = false;
                record_unblock(
                    &mut self.history,
                    status,
                    UnblockCause::ValidationSuccess,
                    now_ms,
                );
            }
        }
    }

    /// Purge expired blocks and return every blocked BSSID.
    pub fn update_and_get_bssid_blocklist(&mut self) -> BTreeSet<String> {
        let now_ms = self.now_ms();
        self.purge_expired(now_ms);
        self.live_statuses()
            .map(|status| status.bssid.clone())
            .collect()
    }

    /// Purge expired blocks and return the blocked BSSIDs of one network.
    pub fn update_and_get_bssid_blocklist_for_ssid(&mut self, ssid: &str) -> BTreeSet<String> {
        let now_ms = self.now_ms();
        self.purge_expired(now_ms);
        self.live_statuses()
            .filter(|status| status.ssid == ssid)
            .map(|status| status.bssid.clone())
            .collect()
    }

    pub fn update_and_get_num_blocked_bssids_for_ssid(&mut self, ssid: &str) -> usize {
        self.update_and_get_bssid_blocklist_for_ssid(ssid).len()
    }

    /// Push the blocked BSSIDs of `ssid` to the firmware, most recent first,
    /// truncated to what the firmware can hold. An empty list is still sent so
    /// stale firmware state gets cleared.
    pub fn update_firmware_roaming_configuration(&mut self, ssid: &str) {
        if !self.firmware.is_firmware_roaming_supported() {
            return;
        }
        let capacity = self.firmware.max_num_blocklist_bssid();
        if capacity <= 0 {
            error!(capacity, "Invalid firmware blocklist capacity");
            return;
        }
        let now_ms = self.now_ms();
        self.purge_expired(now_ms);

        let mut blocked: Vec<&BssidStatus> = self
            .live_statuses()
            .filter(|status| status.ssid == ssid)
            .collect();
        blocked.sort_by(|a, b| {
            b.block_end_time_ms
                .cmp(&a.block_end_time_ms)
                .then(b.block_start_time_ms.cmp(&a.block_start_time_ms))
                .then(a.bssid.cmp(&b.bssid))
        });
        let blocked: Vec<String> = blocked
            .into_iter()
            .take(capacity as usize)
            .map(|status| status.bssid.clone())
            .collect();

        if self
            .firmware
            .set_firmware_roaming_configuration(&blocked, &[])
        {
            debug!(ssid, count = blocked.len(), "Firmware roaming configuration updated");
        } else {
            warn!(ssid, count = blocked.len(), "Firmware rejected roaming configuration");
        }
    }

    /// Lift RSSI-sensitive blocks for BSSIDs that now have a good enough signal.
    /// Streaks are left alone.
    pub fn try_enabling_blocked_bssids(&mut self, scan_details: &[ScanDetail]) {
        let now_ms = self.now_ms();
        self.purge_expired(now_ms);
        for detail in scan_details {
            let Some(status) = self.statuses.get(&detail.bssid) else {
                continue;
            };
            if !status.is_blocked || !status.block_reason.is_low_rssi_sensitive() {
                continue;
            }
            let Some(band) = detail.band() else {
                debug!(
                    bssid = %detail.bssid,
                    frequency_mhz = detail.frequency_mhz,
                    "Skipping scan result with unknown band"
                );
                continue;
            };
            let sufficient = self.config.rssi.sufficient_rssi(band);
            let blocked_rssi = status.rssi_at_block_time;
            let improved = blocked_rssi < sufficient
                && detail.rssi >= sufficient
                && detail.rssi.saturating_sub(blocked_rssi) >= self.config.min_rssi_diff_to_unblock;
            if improved {
                if let Some(status) = self.statuses.remove(&detail.bssid) {
                    debug!(
                        bssid = %detail.bssid,
                        rssi = detail.rssi,
                        blocked_rssi,
                        sufficient,
                        "Signal improved"
                    );
                    record_unblock(
                        &mut self.history,
                        &status,
                        UnblockCause::RssiImproved,
                        now_ms,
                    );
                }
            }
        }
    }

    /// Block a BSSID for a fixed time, bypassing thresholds and streaks.
    /// Missing or invalid identities and negative durations are ignored.
    pub fn block_bssid_for_duration_ms(
        &mut self,
        bssid: Option<&str>,
        ssid: Option<&str>,
        duration_ms: i64,
        reason: FailureReason,
        rssi: i32,
    ) {
        let (Some(bssid), Some(ssid)) = (bssid, ssid) else {
            debug!(duration_ms, "Ignoring block request without identity");
            return;
        };
        if !is_valid_identity(bssid, ssid) || duration_ms < 0 {
            debug!(bssid, ssid, duration_ms, "Ignoring invalid block request");
            return;
        }
        let now_ms = self.now_ms();
        self.drop_stale_status(bssid, ssid);
        self.add_to_blocklist(bssid, ssid, reason, rssi, now_ms, duration_ms);
    }

    fn remove_statuses(&mut self, ssid: Option<&str>, cause: UnblockCause) {
        let now_ms = self.now_ms();
        let history = &mut self.history;
        self.statuses.retain(|_, status| {
            if ssid.is_some_and(|ssid| status.ssid != ssid) {
                return true;
            }
            if status.is_blocked && !status.is_expired(now_ms) {
                record_unblock(history, status, cause, now_ms);
            }
            false
        });
    }

    /// Forget every tracked BSSID. Streaks are kept.
    pub fn clear_bssid_blocklist(&mut self) {
        self.remove_statuses(None, UnblockCause::Cleared);
    }

    /// Forget every BSSID of one network. Streaks are kept.
    pub fn clear_bssid_blocklist_for_ssid(&mut self, ssid: &str) {
        self.remove_statuses(Some(ssid), UnblockCause::Cleared);
    }

    /// The network was deleted: forget its BSSIDs and their streaks.
    pub fn handle_network_removed(&mut self, ssid: &str) {
        self.remove_statuses(Some(ssid), UnblockCause::NetworkRemoved);
        self.score_card.reset_blocklist_streak_for_ssid(ssid);
    }

    /// Distinct reasons currently blocking BSSIDs of `ssid`.
    #[must_use]
    pub fn failure_reasons_for_ssid(&self, ssid: Option<&str>) -> BTreeSet<FailureReason> {
        let Some(ssid) = ssid else {
            return BTreeSet::new();
        };
        let now_ms = self.now_ms();
        self.live_statuses()
            .filter(|status| status.ssid == ssid && !status.is_expired(now_ms))
            .map(|status| status.block_reason)
            .collect()
    }

    #[must_use]
    pub fn bssid_status_history_logger_size(&self) -> usize {
        self.history.len()
    }

    /// Everything the monitor knows, for dumps and diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> BlocklistSnapshot {
        BlocklistSnapshot {
            now_ms: self.now_ms(),
            statuses: self.statuses.values().cloned().collect(),
            history: self.history.iter().cloned().collect(),
            history_capacity: self.history.capacity(),
        }
    }
}

/// Point-in-time dump of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlocklistSnapshot {
    pub now_ms: i64,
    pub statuses: Vec<BssidStatus>,
    pub history: Vec<HistoryEntry>,
    pub history_capacity: usize,
}

impl BlocklistSnapshot {
    /// BSSIDs whose block has not expired as of `now_ms`.
    #[must_use]
    pub fn blocked_bssids(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|status| status.is_blocked && !status.is_expired(self.now_ms))
            .map(|status| status.bssid.as_str())
            .collect()
    }
}

impl fmt::Display for BlocklistSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BSSID blocklist at {}", format_time_ms(self.now_ms))?;
        if self.statuses.is_empty() {
            writeln!(f, "  (no tracked BSSIDs)")?;
        }
        for status in &self.statuses {
            writeln!(f, "  {status}")?;
        }
        writeln!(
            f,
            "History ({} of {}):",
            self.history.len(),
            self.history_capacity
        )?;
        for entry in &self.history {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

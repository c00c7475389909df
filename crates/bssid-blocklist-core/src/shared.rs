//! Thread-safe handle around a [`BssidBlocklistMonitor`].
//!
//! Every operation takes the one mutex for its whole duration, so each call is
//! a single read-modify-write of the status map and history. A poisoned lock
//! is recovered rather than propagated; the monitor has no invariants that a
//! panicking logger could leave half-updated.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::failure_reason::FailureReason;
use crate::monitor::{BlocklistSnapshot, BssidBlocklistMonitor};
use crate::scan::ScanDetail;

#[derive(Debug, Clone)]
pub struct SharedBlocklistMonitor {
    inner: Arc<Mutex<BssidBlocklistMonitor>>,
}

impl SharedBlocklistMonitor {
    #[must_use]
    pub fn new(monitor: BssidBlocklistMonitor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BssidBlocklistMonitor> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run several operations under one lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut BssidBlocklistMonitor) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn handle_bssid_connection_failure(
        &self,
        bssid: &str,
        ssid: &str,
        reason: FailureReason,
        rssi: i32,
    ) -> bool {
        self.lock()
            .handle_bssid_connection_failure(bssid, ssid, reason, rssi)
    }

    pub fn handle_bssid_connection_success(&self, bssid: &str, ssid: &str) {
        self.lock().handle_bssid_connection_success(bssid, ssid);
    }

    pub fn handle_dhcp_provisioning_success(&self, bssid: &str, ssid: &str) {
        self.lock().handle_dhcp_provisioning_success(bssid, ssid);
    }

    pub fn handle_network_validation_success(&self, bssid: &str, ssid: &str) {
        self.lock().handle_network_validation_success(bssid, ssid);
    }

    pub fn update_and_get_bssid_blocklist(&self) -> BTreeSet<String> {
        self.lock().update_and_get_bssid_blocklist()
    }

    pub fn update_and_get_bssid_blocklist_for_ssid(&self, ssid: &str) -> BTreeSet<String> {
        self.lock().update_and_get_bssid_blocklist_for_ssid(ssid)
    }

    pub fn update_and_get_num_blocked_bssids_for_ssid(&self, ssid: &str) -> usize {
        self.lock().update_and_get_num_blocked_bssids_for_ssid(ssid)
    }

    pub fn update_firmware_roaming_configuration(&self, ssid: &str) {
        self.lock().update_firmware_roaming_configuration(ssid);
    }

    pub fn try_enabling_blocked_bssids(&self, scan_details: &[ScanDetail]) {
        self.lock().try_enabling_blocked_bssids(scan_details);
    }

    pub fn block_bssid_for_duration_ms(
        &self,
        bssid: Option<&str>,
        ssid: Option<&str>,
        duration_ms: i64,
        reason: FailureReason,
        rssi: i32,
    ) {
        self.lock()
            .block_bssid_for_duration_ms(bssid, ssid, duration_ms, reason, rssi);
    }

    pub fn clear_bssid_blocklist(&self) {
        self.lock().clear_bssid_blocklist();
    }

    pub fn clear_bssid_blocklist_for_ssid(&self, ssid: &str) {
        self.lock().clear_bssid_blocklist_for_ssid(ssid);
    }

    pub fn handle_network_removed(&self, ssid: &str) {
        self.lock().handle_network_removed(ssid);
    }

    pub fn failure_reasons_for_ssid(&self, ssid: Option<&str>) -> BTreeSet<FailureReason> {
        self.lock().failure_reasons_for_ssid(ssid)
    }

    pub fn bssid_status_history_logger_size(&self) -> usize {
        self.lock().bssid_status_history_logger_size()
    }

    pub fn snapshot(&self) -> BlocklistSnapshot {
        self.lock().snapshot()
    }
}

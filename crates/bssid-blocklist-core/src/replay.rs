//! Recorded event traces and a deterministic replay driver.
//!
//! A trace is a JSON document listing monitor operations in order. Each event
//! may carry an `at_ms` timestamp; the replay clock jumps there before the
//! event runs, and events without one reuse the previous time.
//!
//! ```json
//! {
//!   "name": "dhcp flaps",
//!   "firmware": { "max_blocklist_size": 4 },
//!   "events": [
//!     { "at_ms": 0, "op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01",
//!       "ssid": "\"home\"", "reason": "dhcp_failure", "rssi": -80 },
//!     { "op": "get_blocklist" }
//!   ]
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::config::BlocklistConfig;
use crate::error::{ReplayError, Result};
use crate::failure_reason::FailureReason;
use crate::monitor::{BlocklistSnapshot, BssidBlocklistMonitor};
use crate::ports::{
    Clock, FirmwarePush, FirmwareRoaming, InMemoryFirmwareRoaming, InMemoryScoreCard,
    ManualClock, NoFirmwareRoaming, StaticWatchdog,
};
use crate::scan::ScanDetail;

// ---------------------------------------------------------------------------
// Trace format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub name: String,
    /// Clock value before the first event.
    #[serde(default)]
    pub start_ms: i64,
    #[serde(default)]
    pub firmware: FirmwareSetup,
    /// BSSIDs the watchdog vetoes from the start.
    #[serde(default)]
    pub watchdog_ignored: Vec<String>,
    pub events: Vec<TraceEntry>,
}

/// Simulated firmware roaming support.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSetup {
    pub supported: bool,
    pub max_blocklist_size: i32,
    /// Acknowledge pushes with `true`.
    pub accept: bool,
}

impl Default for FirmwareSetup {
    fn default() -> Self {
        Self {
            supported: true,
            max_blocklist_size: 16,
            accept: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<i64>,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// One monitor operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    ConnectionFailure {
        bssid: String,
        ssid: String,
        reason: FailureReason,
        #[serde(default)]
        rssi: i32,
    },
    ConnectionSuccess {
        bssid: String,
        ssid: String,
    },
    DhcpSuccess {
        bssid: String,
        ssid: String,
    },
    ValidationSuccess {
        bssid: String,
        ssid: String,
    },
    /// Blocklist for one SSID, or every SSID when omitted.
    GetBlocklist {
        #[serde(default)]
        ssid: Option<String>,
    },
    UpdateFirmware {
        ssid: String,
    },
    Scan {
        results: Vec<ScanDetail>,
    },
    BlockForDuration {
        #[serde(default)]
        bssid: Option<String>,
        #[serde(default)]
        ssid: Option<String>,
        duration_ms: i64,
        reason: FailureReason,
        #[serde(default)]
        rssi: i32,
    },
    /// Clear one SSID, or everything when omitted.
    Clear {
        #[serde(default)]
        ssid: Option<String>,
    },
    NetworkRemoved {
        ssid: String,
    },
    FailureReasons {
        #[serde(default)]
        ssid: Option<String>,
    },
    SetWatchdogIgnore {
        bssid: String,
        ignored: bool,
    },
}

impl TraceEvent {
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::ConnectionSuccess { .. } => "connection_success",
            Self::DhcpSuccess { .. } => "dhcp_success",
            Self::ValidationSuccess { .. } => "validation_success",
            Self::GetBlocklist { .. } => "get_blocklist",
            Self::UpdateFirmware { .. } => "update_firmware",
            Self::Scan { .. } => "scan",
            Self::BlockForDuration { .. } => "block_for_duration",
            Self::Clear { .. } => "clear",
            Self::NetworkRemoved { .. } => "network_removed",
            Self::FailureReasons { .. } => "failure_reasons",
            Self::SetWatchdogIgnore { .. } => "set_watchdog_ignore",
        }
    }
}

impl Trace {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject traces that cannot be replayed before touching the monitor.
    pub fn validate(&self) -> std::result::Result<(), ReplayError> {
        if self.events.is_empty() {
            return Err(ReplayError::EmptyTrace);
        }
        let mut previous_ms = self.start_ms;
        for (index, entry) in self.events.iter().enumerate() {
            if let Some(at_ms) = entry.at_ms {
                if at_ms < previous_ms {
                    return Err(ReplayError::ClockWentBackwards {
                        index,
                        at_ms,
                        previous_ms,
                    });
                }
                previous_ms = at_ms;
            }
            if let TraceEvent::SetWatchdogIgnore { bssid, .. } = &entry.event {
                if bssid.is_empty() {
                    return Err(ReplayError::InvalidEvent {
                        index,
                        reason: "set_watchdog_ignore needs a bssid".to_string(),
                    });
                }
            }
            if let TraceEvent::Scan { results } = &entry.event {
                if let Some(bad) = results.iter().find(|r| r.bssid.is_empty()) {
                    return Err(ReplayError::InvalidEvent {
                        index,
                        reason: format!(
                            "scan result at {} MHz has no bssid",
                            bad.frequency_mhz
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// What one event produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepResult {
    Applied,
    Failure { blocked: bool },
    Blocklist { bssids: Vec<String> },
    Reasons { reasons: Vec<FailureReason> },
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("ok"),
            Self::Failure { blocked: true } => f.write_str("blocked"),
            Self::Failure { blocked: false } => f.write_str("not blocked"),
            Self::Blocklist { bssids } => write!(f, "[{}]", bssids.join(", ")),
            Self::Reasons { reasons } => {
                let names: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub at_ms: i64,
    pub op: &'static str,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    pub ssid: String,
    pub bssid: String,
    pub reason: FailureReason,
    pub streak: u32,
}

/// Everything a replay produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub name: String,
    pub steps: Vec<StepOutcome>,
    pub firmware_pushes: Vec<FirmwarePush>,
    pub streaks: Vec<StreakRecord>,
    pub snapshot: BlocklistSnapshot,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            writeln!(f, "Trace: {}", self.name)?;
        }
        for step in &self.steps {
            writeln!(
                f,
                "#{:<3} @{:>12}ms {:<20} {}",
                step.index, step.at_ms, step.op, step.result
            )?;
        }
        if !self.firmware_pushes.is_empty() {
            writeln!(f, "Firmware pushes:")?;
            for push in &self.firmware_pushes {
                writeln!(f, "  blocked=[{}]", push.blocked.join(", "))?;
            }
        }
        if !self.streaks.is_empty() {
            writeln!(f, "Streaks:")?;
            for record in &self.streaks {
                writeln!(
                    f,
                    "  ssid={} bssid={} {}={}",
                    record.ssid, record.bssid, record.reason, record.streak
                )?;
            }
        }
        write!(f, "{}", self.snapshot)
    }
}

/// Replay `trace` against a fresh monitor with a manual clock and in-memory
/// collaborators. The same trace and config always give the same report.
pub fn replay_trace(trace: &Trace, config: &BlocklistConfig) -> Result<ReplayReport> {
    trace.validate()?;
    let _span = info_span!("replay", trace = %trace.name, events = trace.events.len()).entered();

    let clock = Arc::new(ManualClock::new(trace.start_ms));
    let score_card = Arc::new(InMemoryScoreCard::new());
    let watchdog = Arc::new(StaticWatchdog::new(trace.watchdog_ignored.iter().cloned()));
    let recorder = trace.firmware.supported.then(|| {
        Arc::new(if trace.firmware.accept {
            InMemoryFirmwareRoaming::new(trace.firmware.max_blocklist_size)
        } else {
            InMemoryFirmwareRoaming::rejecting(trace.firmware.max_blocklist_size)
        })
    });
    let firmware: Arc<dyn FirmwareRoaming> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => Arc::new(NoFirmwareRoaming),
    };

    let mut monitor = BssidBlocklistMonitor::new(
        config.clone(),
        clock.clone(),
        score_card.clone(),
        firmware,
        watchdog.clone(),
    );

    let mut steps = Vec::with_capacity(trace.events.len());
    for (index, entry) in trace.events.iter().enumerate() {
        if let Some(at_ms) = entry.at_ms {
            clock.set(at_ms);
        }
        let result = apply(&mut monitor, &watchdog, &entry.event);
        steps.push(StepOutcome {
            index,
            at_ms: clock.wall_clock_millis(),
            op: entry.event.op(),
            result,
        });
    }

    Ok(ReplayReport {
        name: trace.name.clone(),
        steps,
        firmware_pushes: recorder.map(|r| r.pushes()).unwrap_or_default(),
        streaks: score_card
            .streaks()
            .into_iter()
            .map(|(ssid, bssid, reason, streak)| StreakRecord {
                ssid,
                bssid,
                reason,
                streak,
            })
            .collect(),
        snapshot: monitor.snapshot(),
    })
}

fn apply(
    monitor: &mut BssidBlocklistMonitor,
    watchdog: &StaticWatchdog,
    event: &TraceEvent,
) -> StepResult {
    match event {
        TraceEvent::ConnectionFailure {
            bssid,
            ssid,
            reason,
            rssi,
        } => StepResult::Failure {
            blocked: monitor.handle_bssid_connection_failure(bssid, ssid, *reason, *rssi),
        },
        TraceEvent::ConnectionSuccess { bssid, ssid } => {
            monitor.handle_bssid_connection_success(bssid, ssid);
            StepResult::Applied
        }
        TraceEvent::DhcpSuccess { bssid, ssid } => {
            monitor.handle_dhcp_provisioning_success(bssid, ssid);
            StepResult::Applied
        }
        TraceEvent::ValidationSuccess { bssid, ssid } => {
            monitor.handle_network_validation_success(bssid, ssid);
            StepResult::Applied
        }
        TraceEvent::GetBlocklist { ssid } => {
            let bssids = match ssid {
                Some(ssid) => monitor.update_and_get_bssid_blocklist_for_ssid(ssid),
                None => monitor.update_and_get_bssid_blocklist(),
            };
            StepResult::Blocklist {
                bssids: bssids.into_iter().collect(),
            }
        }
        TraceEvent::UpdateFirmware { ssid } => {
            monitor.update_firmware_roaming_configuration(ssid);
            StepResult::Applied
        }
        TraceEvent::Scan { results } => {
            monitor.try_enabling_blocked_bssids(results);
            StepResult::Applied
        }
        TraceEvent::BlockForDuration {
            bssid,
            ssid,
            duration_ms,
            reason,
            rssi,
        } => {
            monitor.block_bssid_for_duration_ms(
                bssid.as_deref(),
                ssid.as_deref(),
                *duration_ms,
                *reason,
                *rssi,
            );
            StepResult::Applied
        }
        TraceEvent::Clear { ssid } => {
            match ssid {
                Some(ssid) => monitor.clear_bssid_blocklist_for_ssid(ssid),
                None => monitor.clear_bssid_blocklist(),
            }
            StepResult::Applied
        }
        TraceEvent::NetworkRemoved { ssid } => {
            monitor.handle_network_removed(ssid);
            StepResult::Applied
        }
        TraceEvent::FailureReasons { ssid } => StepResult::Reasons {
            reasons: monitor
                .failure_reasons_for_ssid(ssid.as_deref())
                .into_iter()
                .collect(),
        },
        TraceEvent::SetWatchdogIgnore { bssid, ignored } => {
            watchdog.set_ignored(bssid, *ignored);
            StepResult::Applied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const TRACE: &str = r#"{
        "name": "dhcp flaps",
        "firmware": { "max_blocklist_size": 1 },
        "events": [
            { "at_ms": 0, "op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01",
              "ssid": "\"home\"", "reason": "dhcp_failure", "rssi": -80 },
            { "op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01",
              "ssid": "\"home\"", "reason": "dhcp_failure", "rssi": -80 },
            { "op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01",
              "ssid": "\"home\"", "reason": "dhcp_failure", "rssi": -80 },
            { "op": "get_blocklist" },
            { "op": "update_firmware", "ssid": "\"home\"" },
            { "at_ms": 300001, "op": "get_blocklist", "ssid": "\"home\"" }
        ]
    }"#;

    #[test]
    fn replays_dhcp_flaps() {
        let trace = Trace::from_json_str(TRACE).unwrap();
        let report = replay_trace(&trace, &BlocklistConfig::default()).unwrap();

        let results: Vec<_> = report.steps.iter().map(|s| s.result.clone()).collect();
        assert_eq!(
            results,
            vec![
                StepResult::Failure { blocked: false },
                StepResult::Failure { blocked: false },
                StepResult::Failure { blocked: true },
                StepResult::Blocklist {
                    bssids: vec!["aa:bb:cc:dd:ee:01".to_string()]
                },
                StepResult::Applied,
                StepResult::Blocklist { bssids: vec![] },
            ]
        );
        assert_eq!(report.steps[5].at_ms, 300_001);
        assert_eq!(
            report.firmware_pushes,
            vec![FirmwarePush {
                blocked: vec!["aa:bb:cc:dd:ee:01".to_string()],
                allowed: vec![],
            }]
        );
        assert_eq!(report.streaks.len(), 1);
        assert_eq!(report.streaks[0].streak, 1);
    }

    #[test]
    fn replay_is_deterministic() {
        let trace = Trace::from_json_str(TRACE).unwrap();
        let config = BlocklistConfig::default();
        let first = replay_trace(&trace, &config).unwrap();
        let second = replay_trace(&trace, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn empty_trace_is_rejected() {
        let trace = Trace::from_json_str(r#"{"events": []}"#).unwrap();
        let err = replay_trace(&trace, &BlocklistConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Replay(ReplayError::EmptyTrace)));
    }

    #[test]
    fn backwards_clock_is_rejected() {
        let trace = Trace::from_json_str(
            r#"{"events": [
                {"at_ms": 10, "op": "get_blocklist"},
                {"at_ms": 5, "op": "get_blocklist"}
            ]}"#,
        )
        .unwrap();
        let err = replay_trace(&trace, &BlocklistConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Replay(ReplayError::ClockWentBackwards {
                index: 1,
                at_ms: 5,
                previous_ms: 10
            })
        ));
    }

    #[test]
    fn unknown_reason_is_a_json_error() {
        let err = Trace::from_json_str(
            r#"{"events": [{"op": "connection_failure", "bssid": "a", "ssid": "b", "reason": "cosmic_rays"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn watchdog_and_scan_events() {
        let trace = Trace::from_json_str(
            r#"{
                "watchdog_ignored": ["aa:bb:cc:dd:ee:01"],
                "events": [
                    {"op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01", "ssid": "\"n\"", "reason": "association_rejection"},
                    {"op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01", "ssid": "\"n\"", "reason": "association_rejection"},
                    {"op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:01", "ssid": "\"n\"", "reason": "association_rejection"},
                    {"op": "set_watchdog_ignore", "bssid": "aa:bb:cc:dd:ee:01", "ignored": false},
                    {"op": "connection_failure", "bssid": "aa:bb:cc:dd:ee:02", "ssid": "\"n\"", "reason": "eap_failure", "rssi": -90},
                    {"op": "scan", "results": [{"bssid": "aa:bb:cc:dd:ee:02", "frequency_mhz": 2412, "rssi": -60}]},
                    {"op": "failure_reasons", "ssid": "\"n\""}
                ]
            }"#,
        )
        .unwrap();
        let report = replay_trace(&trace, &BlocklistConfig::default()).unwrap();
        assert_eq!(report.steps[2].result, StepResult::Failure { blocked: false });
        assert_eq!(report.steps[4].result, StepResult::Failure { blocked: true });
        assert_eq!(report.steps[6].result, StepResult::Reasons { reasons: vec![] });
    }

    #[test]
    fn invalid_scan_result_is_rejected() {
        let trace = Trace::from_json_str(
            r#"{"events": [{"op": "scan", "results": [{"bssid": "", "frequency_mhz": 2412, "rssi": -60}]}]}"#,
        )
        .unwrap();
        let err = trace.validate().unwrap_err();
        assert!(matches!(err, ReplayError::InvalidEvent { index: 0, .. }));
    }

    #[test]
    fn trace_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(&path, TRACE).unwrap();
        let trace = Trace::load(&path).unwrap();
        assert_eq!(trace.name, "dhcp flaps");
        assert_eq!(trace.events.len(), 6);
        assert!(matches!(
            Trace::load(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}

//! Collaborators the blocklist monitor talks to.
//!
//! The monitor owns no persistent state beyond its in-memory status map.
//! Streak counters and connection timestamps live in a [`ScoreCard`], blocked
//! BSSIDs are pushed to a [`FirmwareRoaming`] sink, a [`LastResortWatchdog`]
//! may veto some failure reports, and time comes from a [`Clock`].
//!
//! In-memory implementations are provided for tests, trace replay and hosts
//! that do not persist scores.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::failure_reason::FailureReason;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ── Clock ──────────────────────────────────────────────────────────────────

/// Source of wall-clock time in milliseconds.
pub trait Clock: Send + Sync {
    fn wall_clock_millis(&self) -> i64;
}

/// Real time from the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall_clock_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now_ms
            .fetch_add(delta_ms, Ordering::SeqCst)
            .saturating_add(delta_ms)
    }
}

impl Clock for ManualClock {
    fn wall_clock_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// ── ScoreCard ──────────────────────────────────────────────────────────────

/// Persistent per-BSSID statistics.
///
/// Streaks count how many times in a row a BSSID was blocked for a reason and
/// survive block expiry; they only go back to zero on the matching success
/// event or when the network is removed.
pub trait ScoreCard: Send + Sync {
    fn blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason) -> u32;

    /// Increment the streak and return the new value.
    fn increment_blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason) -> u32;

    fn reset_blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason);

    /// Reset every streak of every BSSID that belongs to `ssid`.
    fn reset_blocklist_streak_for_ssid(&self, ssid: &str);

    /// Time of the last successful connection, 0 if never connected.
    fn connection_timestamp_ms(&self, ssid: &str, bssid: &str) -> i64;

    /// Record a connection time and return the previous one (0 if unset).
    fn set_connection_timestamp_ms(&self, ssid: &str, bssid: &str, timestamp_ms: i64) -> i64;
}

type StreakKey = (String, String, FailureReason);

#[derive(Debug, Default)]
struct ScoreCardState {
    streaks: HashMap<StreakKey, u32>,
    connection_timestamps: HashMap<(String, String), i64>,
}

/// Score card kept in memory only.
#[derive(Debug, Default)]
pub struct InMemoryScoreCard {
    state: Mutex<ScoreCardState>,
}

impl InMemoryScoreCard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every non-zero streak, sorted for stable output.
    #[must_use]
    pub fn streaks(&self) -> Vec<(String, String, FailureReason, u32)> {
        let state = lock(&self.state);
        let mut out: Vec<_> = state
            .streaks
            .iter()
            .filter(|(_, streak)| **streak > 0)
            .map(|((ssid, bssid, reason), streak)| (ssid.clone(), bssid.clone(), *reason, *streak))
            .collect();
        out.sort();
        out
    }
}

fn streak_key(ssid: &str, bssid: &str, reason: FailureReason) -> StreakKey {
    (ssid.to_string(), bssid.to_string(), reason)
}

impl ScoreCard for InMemoryScoreCard {
    fn blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason) -> u32 {
        lock(&self.state)
            .streaks
            .get(&streak_key(ssid, bssid, reason))
            .copied()
            .unwrap_or(0)
    }

    fn increment_blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason) -> u32 {
        let mut state = lock(&self.state);
        let streak = state
            .streaks
            .entry(streak_key(ssid, bssid, reason))
            .or_insert(0);
        *streak = streak.saturating_add(1);
        *streak
    }

    fn reset_blocklist_streak(&self, ssid: &str, bssid: &str, reason: FailureReason) {
        lock(&self.state)
            .streaks
            .remove(&streak_key(ssid, bssid, reason));
    }

    fn reset_blocklist_streak_for_ssid(&self, ssid: &str) {
        lock(&self.state)
            .streaks
            .retain(|(streak_ssid, _, _), _| streak_ssid != ssid);
    }

    fn connection_timestamp_ms(&self, ssid: &str, bssid: &str) -> i64 {
        lock(&self.state)
            .connection_timestamps
            .get(&(ssid.to_string(), bssid.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn set_connection_timestamp_ms(&self, ssid: &str, bssid: &str, timestamp_ms: i64) -> i64 {
        lock(&self.state)
            .connection_timestamps
            .insert((ssid.to_string(), bssid.to_string()), timestamp_ms)
            .unwrap_or(0)
    }
}

// ── Firmware roaming ───────────────────────────────────────────────────────

/// Firmware roaming control: the firmware refuses to roam to blocked BSSIDs.
pub trait FirmwareRoaming: Send + Sync {
    fn is_firmware_roaming_supported(&self) -> bool;

    /// How many BSSIDs the firmware blocklist can hold.
    fn max_num_blocklist_bssid(&self) -> i32;

    /// Replace the firmware lists. Returns `false` if the firmware rejected them.
    fn set_firmware_roaming_configuration(&self, blocked: &[String], allowed: &[String]) -> bool;
}

/// Firmware without roaming support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFirmwareRoaming;

impl FirmwareRoaming for NoFirmwareRoaming {
    fn is_firmware_roaming_supported(&self) -> bool {
        false
    }

    fn max_num_blocklist_bssid(&self) -> i32 {
        0
    }

    fn set_firmware_roaming_configuration(&self, _blocked: &[String], _allowed: &[String]) -> bool {
        false
    }
}

/// One configuration push received by [`InMemoryFirmwareRoaming`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FirmwarePush {
    pub blocked: Vec<String>,
    pub allowed: Vec<String>,
}

/// Firmware stand-in that records every push.
#[derive(Debug)]
pub struct InMemoryFirmwareRoaming {
    max_blocklist_size: i32,
    accept: bool,
    pushes: Mutex<Vec<FirmwarePush>>,
}

impl InMemoryFirmwareRoaming {
    #[must_use]
    pub fn new(max_blocklist_size: i32) -> Self {
        Self {
            max_blocklist_size,
            accept: true,
            pushes: Mutex::new(Vec::new()),
        }
    }

    /// Firmware that records pushes but acknowledges them with `false`.
    #[must_use]
    pub fn rejecting(max_blocklist_size: i32) -> Self {
        Self {
            accept: false,
            ..Self::new(max_blocklist_size)
        }
    }

    #[must_use]
    pub fn pushes(&self) -> Vec<FirmwarePush> {
        lock(&self.pushes).clone()
    }

    #[must_use]
    pub fn last_push(&self) -> Option<FirmwarePush> {
        lock(&self.pushes).last().cloned()
    }
}

impl FirmwareRoaming for InMemoryFirmwareRoaming {
    fn is_firmware_roaming_supported(&self) -> bool {
        true
    }

    fn max_num_blocklist_bssid(&self) -> i32 {
        self.max_blocklist_size
    }

    fn set_firmware_roaming_configuration(&self, blocked: &[String], allowed: &[String]) -> bool {
        lock(&self.pushes).push(FirmwarePush {
            blocked: blocked.to_vec(),
            allowed: allowed.to_vec(),
        });
        self.accept
    }
}

// ── Last-resort watchdog ───────────────────────────────────────────────────

/// The watchdog that takes drastic recovery action when every network fails.
/// While it is diagnosing a BSSID it may ask the monitor not to block it.
pub trait LastResortWatchdog: Send + Sync {
    fn should_ignore_bssid_update(&self, bssid: &str) -> bool;
}

/// Watchdog that never vetoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverIgnoreWatchdog;

impl LastResortWatchdog for NeverIgnoreWatchdog {
    fn should_ignore_bssid_update(&self, _bssid: &str) -> bool {
        false
    }
}

/// Watchdog that vetoes a fixed set of BSSIDs.
#[derive(Debug, Default)]
pub struct StaticWatchdog {
    ignored: Mutex<HashSet<String>>,
}

impl StaticWatchdog {
    #[must_use]
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: Mutex::new(ignored.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_ignored(&self, bssid: &str, ignored: bool) {
        let mut set = lock(&self.ignored);
        if ignored {
            set.insert(bssid.to_string());
        } else {
            set.remove(bssid);
        }
    }
}

impl LastResortWatchdog for StaticWatchdog {
    fn should_ignore_bssid_update(&self, bssid: &str) -> bool {
        lock(&self.ignored).contains(bssid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSID: &str = "\"home\"";
    const BSSID: &str = "aa:bb:cc:dd:ee:01";

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.wall_clock_millis(), 1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.wall_clock_millis(), 1_500);
        clock.set(42);
        assert_eq!(clock.wall_clock_millis(), 42);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.wall_clock_millis() > 1_577_836_800_000);
    }

    #[test]
    fn streaks_are_keyed_by_ssid_bssid_and_reason() {
        let card = InMemoryScoreCard::new();
        assert_eq!(card.blocklist_streak(SSID, BSSID, FailureReason::DhcpFailure), 0);
        assert_eq!(
            card.increment_blocklist_streak(SSID, BSSID, FailureReason::DhcpFailure),
            1
        );
        assert_eq!(
            card.increment_blocklist_streak(SSID, BSSID, FailureReason::DhcpFailure),
            2
        );
        assert_eq!(card.blocklist_streak(SSID, BSSID, FailureReason::EapFailure), 0);
        assert_eq!(
            card.blocklist_streak("\"other\"", BSSID, FailureReason::DhcpFailure),
            0
        );

        card.reset_blocklist_streak(SSID, BSSID, FailureReason::DhcpFailure);
        assert_eq!(card.blocklist_streak(SSID, BSSID, FailureReason::DhcpFailure), 0);
    }

    #[test]
    fn reset_for_ssid_only_touches_that_ssid() {
        let card = InMemoryScoreCard::new();
        card.increment_blocklist_streak(SSID, BSSID, FailureReason::WrongPassword);
        card.increment_blocklist_streak(SSID, "aa:bb:cc:dd:ee:02", FailureReason::EapFailure);
        card.increment_blocklist_streak("\"other\"", BSSID, FailureReason::WrongPassword);

        card.reset_blocklist_streak_for_ssid(SSID);

        assert_eq!(
            card.streaks(),
            vec![(
                "\"other\"".to_string(),
                BSSID.to_string(),
                FailureReason::WrongPassword,
                1
            )]
        );
    }

    #[test]
    fn connection_timestamp_returns_previous() {
        let card = InMemoryScoreCard::new();
        assert_eq!(card.connection_timestamp_ms(SSID, BSSID), 0);
        assert_eq!(card.set_connection_timestamp_ms(SSID, BSSID, 100), 0);
        assert_eq!(card.set_connection_timestamp_ms(SSID, BSSID, 200), 100);
        assert_eq!(card.connection_timestamp_ms(SSID, BSSID), 200);
    }

    #[test]
    fn in_memory_firmware_records_pushes() {
        let firmware = InMemoryFirmwareRoaming::new(2);
        assert!(firmware.is_firmware_roaming_supported());
        assert_eq!(firmware.max_num_blocklist_bssid(), 2);
        assert!(firmware.set_firmware_roaming_configuration(&[BSSID.to_string()], &[]));
        assert_eq!(
            firmware.last_push(),
            Some(FirmwarePush {
                blocked: vec![BSSID.to_string()],
                allowed: vec![],
            })
        );

        let rejecting = InMemoryFirmwareRoaming::rejecting(2);
        assert!(!rejecting.set_firmware_roaming_configuration(&[], &[]));
        assert_eq!(rejecting.pushes().len(), 1);
    }

    #[test]
    fn static_watchdog_vetoes_listed_bssids() {
        let watchdog = StaticWatchdog::new([BSSID]);
        assert!(watchdog.should_ignore_bssid_update(BSSID));
        assert!(!watchdog.should_ignore_bssid_update("aa:bb:cc:dd:ee:02"));
        watchdog.set_ignored(BSSID, false);
        assert!(!watchdog.should_ignore_bssid_update(BSSID));
        assert!(!NeverIgnoreWatchdog.should_ignore_bssid_update(BSSID));
    }
}

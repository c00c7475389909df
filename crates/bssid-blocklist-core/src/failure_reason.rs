//! Connection failure reasons and their blocklist policy flags.
//!
//! Every reason carries a stable numeric code (the order the Wi-Fi service
//! reports them in), a default disable threshold, and a handful of flags that
//! drive how the monitor treats it:
//!
//! | reason | threshold | watchdog | low RSSI | reset on |
//! |--------|----------:|:--------:|:--------:|----------|
//! | `ApUnableToHandleNewSta` | 1 | | | L2 success |
//! | `NetworkValidationFailure` | 1 | | yes | validation success |
//! | `WrongPassword` | 1 | | | L2 success |
//! | `EapFailure` | 1 | | yes | L2 success |
//! | `AssociationRejection` | 3 | yes | yes | L2 success |
//! | `AssociationTimeout` | 3 | | yes | L2 success |
//! | `AuthenticationFailure` | 3 | yes | yes | L2 success |
//! | `DhcpFailure` | 3 | yes | yes | DHCP success |
//! | `AbnormalDisconnect` | 3 | | yes | slow L2 success |
//! | `FrameworkDisconnectMboOce` | 1 | | | never |
//! | `FrameworkDisconnectFastReconnect` | 1 | | | never |
//! | `FrameworkDisconnectConnectedScore` | 1 | | yes | slow L2 success |

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a connection to a BSSID failed (or why the framework dropped it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ApUnableToHandleNewSta,
    NetworkValidationFailure,
    WrongPassword,
    EapFailure,
    AssociationRejection,
    AssociationTimeout,
    AuthenticationFailure,
    DhcpFailure,
    AbnormalDisconnect,
    FrameworkDisconnectMboOce,
    FrameworkDisconnectFastReconnect,
    FrameworkDisconnectConnectedScore,
}

impl FailureReason {
    /// Number of distinct reasons.
    pub const COUNT: usize = 12;

    /// All reasons in code order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::ApUnableToHandleNewSta,
        Self::NetworkValidationFailure,
        Self::WrongPassword,
        Self::EapFailure,
        Self::AssociationRejection,
        Self::AssociationTimeout,
        Self::AuthenticationFailure,
        Self::DhcpFailure,
        Self::AbnormalDisconnect,
        Self::FrameworkDisconnectMboOce,
        Self::FrameworkDisconnectFastReconnect,
        Self::FrameworkDisconnectConnectedScore,
    ];

    /// Reasons whose streaks and counters are cleared by an L2 connection success.
    pub const L2_SUCCESS_RESET: [Self; 6] = [
        Self::ApUnableToHandleNewSta,
        Self::WrongPassword,
        Self::EapFailure,
        Self::AssociationRejection,
        Self::AssociationTimeout,
        Self::AuthenticationFailure,
    ];

    /// Reasons that are only cleared by an L2 success once the previous
    /// connection is old enough.
    pub const SLOW_RESET: [Self; 2] = [
        Self::AbnormalDisconnect,
        Self::FrameworkDisconnectConnectedScore,
    ];

    /// Stable numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a reason by numeric code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Name used in logs and dumps, e.g. `REASON_DHCP_FAILURE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApUnableToHandleNewSta => "REASON_AP_UNABLE_TO_HANDLE_NEW_STA",
            Self::NetworkValidationFailure => "REASON_NETWORK_VALIDATION_FAILURE",
            Self::WrongPassword => "REASON_WRONG_PASSWORD",
            Self::EapFailure => "REASON_EAP_FAILURE",
            Self::AssociationRejection => "REASON_ASSOCIATION_REJECTION",
            Self::AssociationTimeout => "REASON_ASSOCIATION_TIMEOUT",
            Self::AuthenticationFailure => "REASON_AUTHENTICATION_FAILURE",
            Self::DhcpFailure => "REASON_DHCP_FAILURE",
            Self::AbnormalDisconnect => "REASON_ABNORMAL_DISCONNECT",
            Self::FrameworkDisconnectMboOce => "REASON_FRAMEWORK_DISCONNECT_MBO_OCE",
            Self::FrameworkDisconnectFastReconnect => {
                "REASON_FRAMEWORK_DISCONNECT_FAST_RECONNECT"
            }
            Self::FrameworkDisconnectConnectedScore => {
                "REASON_FRAMEWORK_DISCONNECT_CONNECTED_SCORE"
            }
        }
    }

    /// Consecutive failures needed before the BSSID is blocked.
    #[must_use]
    pub const fn default_threshold(self) -> u32 {
        match self {
            Self::AssociationRejection
            | Self::AssociationTimeout
            | Self::AuthenticationFailure
            | Self::DhcpFailure
            | Self::AbnormalDisconnect => 3,
            _ => 1,
        }
    }

    /// Failures the last-resort watchdog is diagnosing on its own; the
    /// watchdog may veto blocklisting for these.
    #[must_use]
    pub const fn is_watchdog_monitored(self) -> bool {
        matches!(
            self,
            Self::AssociationRejection | Self::AuthenticationFailure | Self::DhcpFailure
        )
    }

    /// Failures likely caused by a weak signal. A block for one of these can
    /// be lifted early once the BSSID is seen with a much better RSSI.
    #[must_use]
    pub const fn is_low_rssi_sensitive(self) -> bool {
        matches!(
            self,
            Self::NetworkValidationFailure
                | Self::EapFailure
                | Self::AssociationRejection
                | Self::AssociationTimeout
                | Self::AuthenticationFailure
                | Self::DhcpFailure
                | Self::AbnormalDisconnect
                | Self::FrameworkDisconnectConnectedScore
        )
    }

    #[must_use]
    pub const fn is_l2_success_reset(self) -> bool {
        matches!(
            self,
            Self::ApUnableToHandleNewSta
                | Self::WrongPassword
                | Self::EapFailure
                | Self::AssociationRejection
                | Self::AssociationTimeout
                | Self::AuthenticationFailure
        )
    }

    #[must_use]
    pub const fn uses_slow_reset(self) -> bool {
        matches!(
            self,
            Self::AbnormalDisconnect | Self::FrameworkDisconnectConnectedScore
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    /// Accepts `REASON_DHCP_FAILURE`, `DHCP_FAILURE`, `dhcp_failure` or the
    /// numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown failure code: {code}"));
        }
        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("REASON_").unwrap_or(&upper);
        Self::ALL
            .into_iter()
            .find(|reason| &reason.as_str()["REASON_".len()..] == name)
            .ok_or_else(|| format!("unknown failure reason: {s}"))
    }
}

/// A fixed table with one slot per [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonTable<T> {
    slots: [T; FailureReason::COUNT],
}

impl<T: Copy> ReasonTable<T> {
    /// Table with every slot set to `value`.
    #[must_use]
    pub fn filled(value: T) -> Self {
        Self {
            slots: [value; FailureReason::COUNT],
        }
    }

    /// Build a table by evaluating `f` for every reason.
    #[must_use]
    pub fn from_fn(mut f: impl FnMut(FailureReason) -> T) -> Self {
        Self {
            slots: FailureReason::ALL.map(&mut f),
        }
    }

    /// Iterate `(reason, value)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (FailureReason, T)> + '_ {
        FailureReason::ALL.into_iter().zip(self.slots.iter().copied())
    }
}

impl<T: Copy + Default> Default for ReasonTable<T> {
    fn default() -> Self {
        Self::filled(T::default())
    }
}

impl<T> Index<FailureReason> for ReasonTable<T> {
    type Output = T;

    fn index(&self, reason: FailureReason) -> &T {
        &self.slots[reason.index()]
    }
}

impl<T> IndexMut<FailureReason> for ReasonTable<T> {
    fn index_mut(&mut self, reason: FailureReason) -> &mut T {
        &mut self.slots[reason.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_declaration_order() {
        for (i, reason) in FailureReason::ALL.iter().enumerate() {
            assert_eq!(usize::from(reason.code()), i);
            assert_eq!(FailureReason::from_code(reason.code()), Some(*reason));
        }
        assert_eq!(FailureReason::from_code(12), None);
    }

    #[test]
    fn default_thresholds() {
        assert_eq!(FailureReason::ApUnableToHandleNewSta.default_threshold(), 1);
        assert_eq!(FailureReason::WrongPassword.default_threshold(), 1);
        assert_eq!(FailureReason::EapFailure.default_threshold(), 1);
        assert_eq!(FailureReason::NetworkValidationFailure.default_threshold(), 1);
        assert_eq!(FailureReason::AssociationRejection.default_threshold(), 3);
        assert_eq!(FailureReason::DhcpFailure.default_threshold(), 3);
        assert_eq!(FailureReason::AbnormalDisconnect.default_threshold(), 3);
        assert_eq!(
            FailureReason::FrameworkDisconnectConnectedScore.default_threshold(),
            1
        );
    }

    #[test]
    fn only_three_reasons_are_watchdog_monitored() {
        let monitored: Vec<_> = FailureReason::ALL
            .into_iter()
            .filter(|r| r.is_watchdog_monitored())
            .collect();
        assert_eq!(
            monitored,
            vec![
                FailureReason::AssociationRejection,
                FailureReason::AuthenticationFailure,
                FailureReason::DhcpFailure,
            ]
        );
    }

    #[test]
    fn wrong_password_is_not_rssi_unblockable() {
        assert!(!FailureReason::WrongPassword.is_low_rssi_sensitive());
        assert!(FailureReason::EapFailure.is_low_rssi_sensitive());
    }

    #[test]
    fn reset_groups_match_flags() {
        for reason in FailureReason::L2_SUCCESS_RESET {
            assert!(reason.is_l2_success_reset());
            assert!(!reason.uses_slow_reset());
        }
        for reason in FailureReason::SLOW_RESET {
            assert!(reason.uses_slow_reset());
            assert!(!reason.is_l2_success_reset());
        }
        assert!(!FailureReason::DhcpFailure.is_l2_success_reset());
        assert!(!FailureReason::NetworkValidationFailure.is_l2_success_reset());
    }

    #[test]
    fn parse_accepts_several_spellings() {
        assert_eq!(
            "REASON_DHCP_FAILURE".parse::<FailureReason>(),
            Ok(FailureReason::DhcpFailure)
        );
        assert_eq!(
            "eap_failure".parse::<FailureReason>(),
            Ok(FailureReason::EapFailure)
        );
        assert_eq!(
            "8".parse::<FailureReason>(),
            Ok(FailureReason::AbnormalDisconnect)
        );
        assert!("bogus".parse::<FailureReason>().is_err());
        assert!("99".parse::<FailureReason>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&FailureReason::FrameworkDisconnectMboOce).unwrap();
        assert_eq!(json, "\"framework_disconnect_mbo_oce\"");
        let back: FailureReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FailureReason::FrameworkDisconnectMboOce);
    }

    #[test]
    fn reason_table_indexing() {
        let mut table = ReasonTable::filled(0u32);
        table[FailureReason::DhcpFailure] += 2;
        assert_eq!(table[FailureReason::DhcpFailure], 2);
        assert_eq!(table[FailureReason::EapFailure], 0);

        let thresholds = ReasonTable::from_fn(FailureReason::default_threshold);
        assert_eq!(thresholds[FailureReason::AssociationTimeout], 3);
        assert_eq!(thresholds.iter().count(), FailureReason::COUNT);
    }
}

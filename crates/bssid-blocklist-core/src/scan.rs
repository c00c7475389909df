//! Scan results as seen by the blocklist.

use serde::{Deserialize, Serialize};

/// One BSSID observed in a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDetail {
    pub bssid: String,
    #[serde(default)]
    pub ssid: String,
    pub frequency_mhz: u32,
    pub rssi: i32,
}

impl ScanDetail {
    #[must_use]
    pub fn new(
        bssid: impl Into<String>,
        ssid: impl Into<String>,
        frequency_mhz: u32,
        rssi: i32,
    ) -> Self {
        Self {
            bssid: bssid.into(),
            ssid: ssid.into(),
            frequency_mhz,
            rssi,
        }
    }

    #[must_use]
    pub fn band(&self) -> Option<Band> {
        Band::from_frequency(self.frequency_mhz)
    }
}

/// Radio band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4ghz")]
    Band24Ghz,
    #[serde(rename = "5ghz")]
    Band5Ghz,
    #[serde(rename = "6ghz")]
    Band6Ghz,
}

impl Band {
    /// Classify a channel center frequency. Frequencies outside the three
    /// Wi-Fi bands return `None`.
    #[must_use]
    pub fn from_frequency(frequency_mhz: u32) -> Option<Self> {
        match frequency_mhz {
            2400..=2500 => Some(Self::Band24Ghz),
            4900..=5900 => Some(Self::Band5Ghz),
            5925..=7125 => Some(Self::Band6Ghz),
            _ => None,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Band24Ghz => f.write_str("2.4GHz"),
            Self::Band5Ghz => f.write_str("5GHz"),
            Self::Band6Ghz => f.write_str("6GHz"),
        }
    }
}

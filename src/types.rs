//! Shared radio and network types

use crate::error::{WifiCtlError, WifiCtlResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 6-byte hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> WifiCtlResult<Self> {
        let bytes: [u8; 6] = slice.try_into().map_err(|_| {
            WifiCtlError::InvalidParameter(format!(
                "MAC address must be 6 bytes, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }

    /// Group bit set (includes broadcast)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl FromStr for MacAddress {
    type Err = WifiCtlError;

    fn from_str(s: &str) -> WifiCtlResult<Self> {
        crate::validation::validate_mac_address(s)?;
        let mut bytes = [0u8; 6];
        for (i, part) in s.split(':').enumerate() {
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| {
                WifiCtlError::InvalidParameter(format!("Invalid MAC address: {}", s))
            })?;
        }
        Ok(Self(bytes))
    }
}

/// Authentication mode presented by a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
}

impl AuthMode {
    pub fn is_open(&self) -> bool {
        matches!(self, AuthMode::Open)
    }
}

/// A target or self-hosted network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Raw SSID bytes, at most 32
    pub ssid: Vec<u8>,
    pub bssid: MacAddress,
    /// Primary channel, 1..=13
    pub channel: u8,
    pub auth_mode: AuthMode,
}

impl NetworkDescriptor {
    pub fn new(ssid: impl Into<Vec<u8>>, bssid: MacAddress, channel: u8, auth_mode: AuthMode) -> Self {
        Self {
            ssid: ssid.into(),
            bssid,
            channel,
            auth_mode,
        }
    }

    /// SSID for display, lossy for non-UTF-8 names
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    pub fn validate(&self) -> WifiCtlResult<()> {
        crate::validation::validate_ssid(&self.ssid)?;
        crate::validation::validate_channel(self.channel)?;
        Ok(())
    }
}

/// Access point role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    pub ssid: Vec<u8>,
    pub password: Option<String>,
    pub channel: u8,
    pub max_connections: u8,
    pub auth_mode: AuthMode,
    pub hidden: bool,
    pub pmf_capable: bool,
    pub pmf_required: bool,
}

impl ApConfig {
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    /// Same identity and channel, no client admission
    pub fn closed(&self) -> Self {
        Self {
            max_connections: 0,
            ..self.clone()
        }
    }
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: Vec::new(),
            password: None,
            channel: 1,
            max_connections: 0,
            auth_mode: AuthMode::Open,
            hidden: false,
            pmf_capable: false,
            pmf_required: false,
        }
    }
}

/// Station scan strategy before association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMethod {
    /// Stop at the first matching network on the pinned channel
    Fast,
    /// Sweep every channel and pick the strongest match
    AllChannel,
}

/// Station role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaConfig {
    pub ssid: Vec<u8>,
    pub password: Option<String>,
    pub channel: u8,
    pub scan_method: ScanMethod,
    pub pmf_capable: bool,
    pub pmf_required: bool,
}

impl StaConfig {
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }
}

/// Lowercase hex form of a raw SSID, as accepted by hostapd and wpa_cli
pub fn ssid_hex(ssid: &[u8]) -> String {
    ssid.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Center frequency in MHz of a 2.4GHz channel
pub fn channel_frequency(channel: u8) -> u32 {
    2407 + 5 * u32::from(channel)
}

/// Radio operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RadioMode {
    #[default]
    Idle,
    ApOnly,
    StaOnly,
    ApSta,
}

/// Logical interface of the shared radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WifiInterface {
    Ap,
    Sta,
}

impl fmt::Display for WifiInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiInterface::Ap => write!(f, "AP"),
            WifiInterface::Sta => write!(f, "STA"),
        }
    }
}

/// Snapshot of the radio as seen by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioState {
    pub initialized: bool,
    pub original_ap_mac: MacAddress,
    pub current_channel: u8,
    pub mode: RadioMode,
    /// Set while an attack pins the radio to one channel
    pub channel_locked: bool,
    /// Last AP configuration the driver accepted
    pub ap_config: Option<ApConfig>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            initialized: false,
            original_ap_mac: MacAddress::default(),
            current_channel: 1,
            mode: RadioMode::Idle,
            channel_locked: false,
            ap_config: None,
        }
    }
}

//! Input validation
//!
//! Caller-input checks. Every failure here is a rejected request: the caller
//! gets `InvalidParameter` and no radio state changes.

use crate::error::{WifiCtlError, WifiCtlResult};

/// Maximum length for interface names (Linux kernel limit is 15)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// 802.11 SSID limit in bytes
pub const MAX_SSID_LEN: usize = 32;

/// WPA passphrase limit in bytes
pub const MAX_PASSWORD_LEN: usize = 63;

/// WPA passphrase minimum in bytes
pub const MIN_PASSWORD_LEN: usize = 8;

/// 2.4GHz channels usable by the radio
pub const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 1..=13;

/// Validate interface name to prevent command injection
///
/// Interface names must be alphanumeric with optional dashes and underscores,
/// and no longer than 15 characters (Linux kernel limit)
pub fn validate_interface_name(name: &str) -> WifiCtlResult<()> {
    if name.is_empty() {
        return Err(WifiCtlError::InvalidParameter(
            "Interface name cannot be empty".to_string()
        ));
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(WifiCtlError::InvalidParameter(
            format!("Interface name too long (max {} characters)", MAX_INTERFACE_NAME_LEN)
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
            return Err(WifiCtlError::InvalidParameter(
                format!("Invalid interface name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    if name.starts_with('-') {
        return Err(WifiCtlError::InvalidParameter(
            "Interface name cannot start with dash".to_string()
        ));
    }

    Ok(())
}

/// Validate MAC address format
///
/// Accepts standard MAC format: XX:XX:XX:XX:XX:XX (hex digits)
pub fn validate_mac_address(mac: &str) -> WifiCtlResult<()> {
    if mac.len() != 17 {
        return Err(WifiCtlError::InvalidParameter(
            "MAC address must be in format XX:XX:XX:XX:XX:XX".to_string()
        ));
    }

    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return Err(WifiCtlError::InvalidParameter(
            "MAC address must have 6 octets separated by colons".to_string()
        ));
    }

    for part in parts {
        if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WifiCtlError::InvalidParameter(
                format!("Invalid hex digit in MAC address: {}", part)
            ));
        }
    }

    Ok(())
}

/// Validate raw SSID bytes (0-32 bytes, hidden networks may be empty)
pub fn validate_ssid(ssid: &[u8]) -> WifiCtlResult<()> {
    if ssid.len() > MAX_SSID_LEN {
        return Err(WifiCtlError::InvalidParameter(
            format!("SSID cannot exceed {} bytes (got {})", MAX_SSID_LEN, ssid.len())
        ));
    }
    Ok(())
}

/// Validate the SSID of an access point we host
pub fn validate_ap_ssid(ssid: &[u8]) -> WifiCtlResult<()> {
    if ssid.is_empty() {
        return Err(WifiCtlError::InvalidParameter(
            "SSID cannot be empty".to_string()
        ));
    }
    validate_ssid(ssid)?;

    // Newlines would break the hostapd config
    if ssid.iter().any(|b| *b == b'\n' || *b == b'\r' || *b == 0) {
        return Err(WifiCtlError::InvalidParameter(
            "SSID contains invalid control characters".to_string()
        ));
    }

    Ok(())
}

/// Validate a station password. Only the upper bound applies: open networks
/// take no password and the driver decides what else it accepts.
pub fn validate_sta_password(password: &str) -> WifiCtlResult<()> {
    if password.len() > MAX_PASSWORD_LEN {
        return Err(WifiCtlError::InvalidParameter(
            format!("Password is too long. Max supported length is {}", MAX_PASSWORD_LEN)
        ));
    }
    Ok(())
}

/// Validate a WPA passphrase for an access point we host
pub fn validate_ap_password(password: &str) -> WifiCtlResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(WifiCtlError::InvalidParameter(
            format!("WiFi password must be at least {} characters", MIN_PASSWORD_LEN)
        ));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(WifiCtlError::InvalidParameter(
            format!("WiFi password cannot exceed {} characters", MAX_PASSWORD_LEN)
        ));
    }

    if password.chars().any(|c| c.is_control()) {
        return Err(WifiCtlError::InvalidParameter(
            "WiFi password contains invalid control characters".to_string()
        ));
    }

    Ok(())
}

/// Validate a 2.4GHz channel number
pub fn validate_channel(channel: u8) -> WifiCtlResult<()> {
    if !CHANNEL_RANGE.contains(&channel) {
        return Err(WifiCtlError::InvalidParameter(
            format!("Channel out of range. Expected value from <1,13> but got {}", channel)
        ));
    }
    Ok(())
}

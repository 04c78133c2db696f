//! Configuration management for wifictl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{WifiCtlError, WifiCtlResult};
use crate::types::{ApConfig, AuthMode};
use crate::validation;

/// Main wifictl configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiCtlConfig {
    /// Management access point identity
    #[serde(default)]
    pub mgmt_ap: MgmtApSettings,
    /// Attack timing and rogue AP presentation
    #[serde(default)]
    pub attack: AttackSettings,
    /// Linux backend interfaces and tools
    #[serde(default)]
    pub linux: LinuxSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgmtApSettings {
    #[serde(default = "default_mgmt_ssid")]
    pub ssid: String,
    #[serde(default = "default_mgmt_password")]
    pub password: String,
    #[serde(default = "default_mgmt_max_connections")]
    pub max_connections: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSettings {
    /// Period between broadcast deauth bursts
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Frames sent per burst
    #[serde(default = "default_deauth_burst")]
    pub deauth_burst: u32,
    /// SequentialDeauth wait for a handshake per client
    #[serde(default = "default_client_window_ms")]
    pub client_window_ms: u64,
    /// Longest single receive wait
    #[serde(default = "default_capture_slice_ms")]
    pub capture_slice_ms: u64,
    /// Bound on joining a background strategy task at stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_rogue_ap_password")]
    pub rogue_ap_password: String,
    #[serde(default = "default_rogue_ap_max_connections")]
    pub rogue_ap_max_connections: u8,
    /// Bring the management AP back when a RogueAP attack stops
    #[serde(default = "default_true")]
    pub restore_management_ap: bool,
    /// 802.11 reason code carried in deauth frames
    #[serde(default = "default_deauth_reason")]
    pub deauth_reason: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxSettings {
    /// Physical interface, used for the station role
    #[serde(default = "default_phy_interface")]
    pub phy_interface: String,
    /// Virtual interface created for the AP role
    #[serde(default = "default_ap_interface")]
    pub ap_interface: String,
    /// Runtime directory for generated hostapd config and pid
    #[serde(default = "default_runtime_dir")]
    pub config_dir: PathBuf,
    #[serde(default = "default_hostapd_bin")]
    pub hostapd_bin: PathBuf,
    #[serde(default = "default_wpa_cli_bin")]
    pub wpa_cli_bin: PathBuf,
    /// wpa_supplicant status poll period
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

fn default_mgmt_ssid() -> String {
    "ManagementAP".to_string()
}

fn default_mgmt_password() -> String {
    "mgmtadmin".to_string()
}

fn default_mgmt_max_connections() -> u8 {
    1
}

fn default_broadcast_interval_ms() -> u64 {
    5000
}

fn default_deauth_burst() -> u32 {
    3
}

fn default_client_window_ms() -> u64 {
    5000
}

fn default_capture_slice_ms() -> u64 {
    250
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_rogue_ap_password() -> String {
    "dummypassword".to_string()
}

fn default_rogue_ap_max_connections() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_deauth_reason() -> u16 {
    7
}

fn default_phy_interface() -> String {
    "wlan0".to_string()
}

fn default_ap_interface() -> String {
    "wlan0ap".to_string()
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("/run/wifictl")
}

fn default_hostapd_bin() -> PathBuf {
    PathBuf::from("/usr/sbin/hostapd")
}

fn default_wpa_cli_bin() -> PathBuf {
    PathBuf::from("/usr/sbin/wpa_cli")
}

fn default_status_poll_ms() -> u64 {
    1000
}

impl Default for MgmtApSettings {
    fn default() -> Self {
        Self {
            ssid: default_mgmt_ssid(),
            password: default_mgmt_password(),
            max_connections: default_mgmt_max_connections(),
        }
    }
}

impl MgmtApSettings {
    /// Fixed-identity management AP: channel 1, WPA2-PSK, visible, no PMF
    pub fn ap_config(&self) -> ApConfig {
        ApConfig {
            ssid: self.ssid.as_bytes().to_vec(),
            password: Some(self.password.clone()),
            channel: 1,
            max_connections: self.max_connections,
            auth_mode: AuthMode::Wpa2Psk,
            hidden: false,
            pmf_capable: false,
            pmf_required: false,
        }
    }
}

impl Default for AttackSettings {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: default_broadcast_interval_ms(),
            deauth_burst: default_deauth_burst(),
            client_window_ms: default_client_window_ms(),
            capture_slice_ms: default_capture_slice_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            rogue_ap_password: default_rogue_ap_password(),
            rogue_ap_max_connections: default_rogue_ap_max_connections(),
            restore_management_ap: default_true(),
            deauth_reason: default_deauth_reason(),
        }
    }
}

impl AttackSettings {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn client_window(&self) -> Duration {
        Duration::from_millis(self.client_window_ms)
    }

    pub fn capture_slice(&self) -> Duration {
        Duration::from_millis(self.capture_slice_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> WifiCtlResult<()> {
        if self.broadcast_interval_ms == 0
            || self.client_window_ms == 0
            || self.capture_slice_ms == 0
            || self.stop_timeout_ms == 0
        {
            return Err(WifiCtlError::Config(
                "attack timings must be non-zero".to_string()
            ));
        }
        if self.deauth_burst == 0 {
            return Err(WifiCtlError::Config(
                "attack.deauth_burst must be at least 1".to_string()
            ));
        }
        // A closed rogue AP would report up while admitting nobody
        if self.rogue_ap_max_connections == 0 {
            return Err(WifiCtlError::Config(
                "attack.rogue_ap_max_connections must be at least 1".to_string()
            ));
        }
        validation::validate_ap_password(&self.rogue_ap_password)
            .map_err(|e| WifiCtlError::Config(format!("attack.rogue_ap_password: {}", e)))
    }
}

impl Default for LinuxSettings {
    fn default() -> Self {
        Self {
            phy_interface: default_phy_interface(),
            ap_interface: default_ap_interface(),
            config_dir: default_runtime_dir(),
            hostapd_bin: default_hostapd_bin(),
            wpa_cli_bin: default_wpa_cli_bin(),
            status_poll_ms: default_status_poll_ms(),
        }
    }
}

impl WifiCtlConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> WifiCtlResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WifiCtlError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| WifiCtlError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> WifiCtlResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WifiCtlError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| WifiCtlError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Check values that would otherwise fail deep inside the radio
    pub fn validate(&self) -> WifiCtlResult<()> {
        validation::validate_ap_ssid(self.mgmt_ap.ssid.as_bytes())
            .and_then(|_| validation::validate_ap_password(&self.mgmt_ap.password))
            .map_err(|e| WifiCtlError::Config(format!("mgmt_ap: {}", e)))?;

        self.attack.validate()?;

        validation::validate_interface_name(&self.linux.phy_interface)
            .and_then(|_| validation::validate_interface_name(&self.linux.ap_interface))
            .map_err(|e| WifiCtlError::Config(format!("linux: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WifiCtlConfig::default();
        assert_eq!(config.mgmt_ap.ssid, "ManagementAP");
        assert_eq!(config.mgmt_ap.max_connections, 1);
        assert_eq!(config.attack.broadcast_interval(), Duration::from_secs(5));
        assert!(config.attack.restore_management_ap);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: WifiCtlConfig = toml::from_str(
            "[mgmt_ap]\nssid = \"Lab\"\n\n[attack]\nclient_window_ms = 100\n",
        )
        .unwrap();
        assert_eq!(config.mgmt_ap.ssid, "Lab");
        assert_eq!(config.mgmt_ap.password, "mgmtadmin");
        assert_eq!(config.attack.client_window(), Duration::from_millis(100));
        assert_eq!(config.attack.deauth_burst, 3);
        assert_eq!(config.linux.ap_interface, "wlan0ap");
    }

    #[test]
    fn test_mgmt_ap_config() {
        let ap = MgmtApSettings::default().ap_config();
        assert_eq!(ap.channel, 1);
        assert_eq!(ap.auth_mode, AuthMode::Wpa2Psk);
        assert!(!ap.hidden);
        assert!(!ap.pmf_capable && !ap.pmf_required);
        assert_eq!(ap.password.as_deref(), Some("mgmtadmin"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WifiCtlConfig::default();
        config.mgmt_ap.password = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = WifiCtlConfig::default();
        config.attack.capture_slice_ms = 0;
        assert!(config.validate().is_err());

        let mut config = WifiCtlConfig::default();
        config.linux.ap_interface = "wlan0;reboot".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rogue_ap_settings() {
        let mut config = WifiCtlConfig::default();
        config.attack.rogue_ap_max_connections = 0;
        assert!(matches!(config.validate(), Err(WifiCtlError::Config(_))));

        for password in ["short", &"p".repeat(64)] {
            let mut config = WifiCtlConfig::default();
            config.attack.rogue_ap_password = password.to_string();
            assert!(matches!(config.validate(), Err(WifiCtlError::Config(_))));
        }

        let mut config = WifiCtlConfig::default();
        config.attack.rogue_ap_password = "p".repeat(63);
        config.attack.rogue_ap_max_connections = 4;
        assert!(config.validate().is_ok());
    }
}

//! WPA Supplicant control
//!
//! Runtime control of the station role through wpa_cli. wpa_supplicant itself
//! is expected to be running on the station interface.

use crate::error::{WifiCtlError, WifiCtlResult};
use crate::types::{channel_frequency, ssid_hex, ScanMethod, StaConfig};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// WPA Supplicant connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WpaState {
    Disconnected,
    Inactive,
    Scanning,
    Authenticating,
    Associating,
    Associated,
    FourWayHandshake,
    GroupHandshake,
    Completed,
    Unknown,
}

impl From<&str> for WpaState {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DISCONNECTED" => WpaState::Disconnected,
            "INACTIVE" | "INTERFACE_DISABLED" => WpaState::Inactive,
            "SCANNING" => WpaState::Scanning,
            "AUTHENTICATING" => WpaState::Authenticating,
            "ASSOCIATING" => WpaState::Associating,
            "ASSOCIATED" => WpaState::Associated,
            "4WAY_HANDSHAKE" => WpaState::FourWayHandshake,
            "GROUP_HANDSHAKE" => WpaState::GroupHandshake,
            "COMPLETED" => WpaState::Completed,
            _ => WpaState::Unknown,
        }
    }
}

/// Connection status from wpa_supplicant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpaStatus {
    pub state: WpaState,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub frequency: Option<u32>,
    pub ip_address: Option<String>,
}

impl WpaStatus {
    /// Parse `wpa_cli status` output
    pub fn parse(output: &str) -> Self {
        let mut status = WpaStatus {
            state: WpaState::Unknown,
            ssid: None,
            bssid: None,
            frequency: None,
            ip_address: None,
        };

        for line in output.lines() {
            if let Some((key, value)) = line.split_once('=') {
                match key {
                    "wpa_state" => status.state = WpaState::from(value),
                    "ssid" => status.ssid = Some(value.to_string()),
                    "bssid" => status.bssid = Some(value.to_string()),
                    "freq" => status.frequency = value.parse().ok(),
                    "ip_address" => status.ip_address = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        status
    }

    pub fn is_connected(&self) -> bool {
        self.state == WpaState::Completed
    }
}

/// WPA Supplicant controller
pub struct WpaSupplicantController {
    /// Path to wpa_cli binary
    wpa_cli_bin: PathBuf,
}

impl WpaSupplicantController {
    pub fn new(wpa_cli_bin: PathBuf) -> Self {
        Self { wpa_cli_bin }
    }

    /// Get connection status
    pub async fn status(&self, interface: &str) -> WifiCtlResult<WpaStatus> {
        validation::validate_interface_name(interface)?;
        let output = self.wpa_cli(interface, &["status"]).await?;
        Ok(WpaStatus::parse(&output))
    }

    /// Add a network block for `config`. Returns the network id.
    pub async fn add_network(&self, interface: &str, config: &StaConfig) -> WifiCtlResult<String> {
        validation::validate_interface_name(interface)?;

        let output = self.wpa_cli(interface, &["add_network"]).await?;
        let network_id = output.trim().to_string();
        debug!("Added network with id: {}", network_id);

        for (key, value) in network_settings(config) {
            if let Err(e) = self
                .wpa_cli(interface, &["set_network", &network_id, key, &value])
                .await
            {
                let _ = self.wpa_cli(interface, &["remove_network", &network_id]).await;
                return Err(e);
            }
        }

        Ok(network_id)
    }

    /// Ask wpa_supplicant to associate with `network_id`. Returns as soon as
    /// the request is accepted; the outcome shows up in `status`.
    pub async fn select_network(&self, interface: &str, network_id: &str) -> WifiCtlResult<()> {
        validation::validate_interface_name(interface)?;
        info!("Requesting connection on {} (network {})", interface, network_id);
        self.wpa_cli(interface, &["enable_network", network_id]).await?;
        self.wpa_cli(interface, &["select_network", network_id]).await?;
        Ok(())
    }

    pub async fn remove_network(&self, interface: &str, network_id: &str) -> WifiCtlResult<()> {
        validation::validate_interface_name(interface)?;
        self.wpa_cli(interface, &["remove_network", network_id]).await?;
        Ok(())
    }

    /// Disconnect from current network
    pub async fn disconnect(&self, interface: &str) -> WifiCtlResult<()> {
        validation::validate_interface_name(interface)?;
        info!("Disconnecting WiFi on {}", interface);
        self.wpa_cli(interface, &["disconnect"]).await?;
        Ok(())
    }

    /// Run wpa_cli command
    async fn wpa_cli(&self, interface: &str, args: &[&str]) -> WifiCtlResult<String> {
        let mut cmd = Command::new(&self.wpa_cli_bin);
        cmd.arg("-i").arg(interface);
        cmd.args(args);

        let cmd_str = format!("wpa_cli -i {} {}", interface, args.first().copied().unwrap_or_default());
        debug!("Running: {}", cmd_str);

        let output = cmd.output().await.map_err(|e| WifiCtlError::CommandFailed {
            cmd: cmd_str.clone(),
            code: None,
            stderr: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(WifiCtlError::CommandFailed {
                cmd: cmd_str,
                code: output.status.code(),
                stderr,
            });
        }

        // wpa_cli returns "FAIL" on errors even with exit code 0
        if stdout.trim() == "FAIL" {
            return Err(WifiCtlError::CommandFailed {
                cmd: cmd_str,
                code: None,
                stderr: "wpa_cli returned FAIL".to_string(),
            });
        }

        Ok(stdout)
    }
}

/// `set_network` key/value pairs for a station config. The SSID goes in hex
/// form so arbitrary bytes survive.
fn network_settings(config: &StaConfig) -> Vec<(&'static str, String)> {
    let mut settings = vec![("ssid", ssid_hex(&config.ssid))];

    match &config.password {
        Some(password) => settings.push(("psk", format!("\"{}\"", password))),
        None => settings.push(("key_mgmt", "NONE".to_string())),
    }

    if config.scan_method == ScanMethod::Fast {
        settings.push(("scan_freq", channel_frequency(config.channel).to_string()));
    }

    let pmf = match (config.pmf_required, config.pmf_capable) {
        (true, _) => "2",
        (false, true) => "1",
        _ => "0",
    };
    settings.push(("ieee80211w", pmf.to_string()));
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpa_state_from_str() {
        assert_eq!(WpaState::from("COMPLETED"), WpaState::Completed);
        assert_eq!(WpaState::from("DISCONNECTED"), WpaState::Disconnected);
        assert_eq!(WpaState::from("4WAY_HANDSHAKE"), WpaState::FourWayHandshake);
        assert_eq!(WpaState::from("unknown"), WpaState::Unknown);
    }

    #[test]
    fn test_status_parse() {
        let status = WpaStatus::parse(
            "bssid=00:11:22:33:44:55\nfreq=2437\nssid=Home\nwpa_state=COMPLETED\nip_address=192.168.1.20\n",
        );
        assert!(status.is_connected());
        assert_eq!(status.frequency, Some(2437));
        assert_eq!(status.ssid.as_deref(), Some("Home"));
        assert_eq!(status.ip_address.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_network_settings() {
        let config = StaConfig {
            ssid: b"Home".to_vec(),
            password: Some("password123".to_string()),
            channel: 6,
            scan_method: ScanMethod::Fast,
            pmf_capable: true,
            pmf_required: false,
        };
        let settings = network_settings(&config);
        assert!(settings.contains(&("ssid", "486f6d65".to_string())));
        assert!(settings.contains(&("psk", "\"password123\"".to_string())));
        assert!(settings.contains(&("scan_freq", "2437".to_string())));
        assert!(settings.contains(&("ieee80211w", "1".to_string())));

        let open = StaConfig {
            password: None,
            scan_method: ScanMethod::AllChannel,
            ..config
        };
        let settings = network_settings(&open);
        assert!(settings.contains(&("key_mgmt", "NONE".to_string())));
        assert!(!settings.iter().any(|(k, _)| *k == "scan_freq"));
    }
}

//! hostapd management for the AP role
//!
//! Configuration generation and process control for hostapd

use crate::error::{WifiCtlError, WifiCtlResult};
use crate::types::{ssid_hex, ApConfig, AuthMode};
use crate::validation;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

/// hostapd controller
pub struct HostapdController {
    hostapd_bin: PathBuf,
    config_dir: PathBuf,
    pid_file: PathBuf,
}

impl HostapdController {
    pub fn new(hostapd_bin: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            hostapd_bin,
            pid_file: config_dir.join("hostapd.pid"),
            config_dir,
        }
    }

    /// Generate hostapd configuration file for `config` on `interface`
    pub fn generate_config(&self, interface: &str, config: &ApConfig) -> WifiCtlResult<String> {
        validation::validate_interface_name(interface)?;

        let mut conf = String::new();
        conf.push_str(&format!("interface={}\n", interface));
        conf.push_str("driver=nl80211\n");
        match std::str::from_utf8(&config.ssid) {
            Ok(ssid) if !ssid.chars().any(char::is_control) => {
                conf.push_str(&format!("ssid={}\n", ssid));
            }
            _ => conf.push_str(&format!("ssid2={}\n", ssid_hex(&config.ssid))),
        }
        conf.push_str("hw_mode=g\n");
        conf.push_str(&format!("channel={}\n", config.channel));

        if config.hidden {
            conf.push_str("ignore_broadcast_ssid=1\n");
        }

        let password = || {
            config.password.as_deref().ok_or_else(|| {
                WifiCtlError::InvalidParameter(format!(
                    "Password required for {:?} access point",
                    config.auth_mode
                ))
            })
        };

        let mut pmf = match (config.pmf_required, config.pmf_capable) {
            (true, _) => 2,
            (false, true) => 1,
            _ => 0,
        };

        match config.auth_mode {
            AuthMode::Open => {}
            AuthMode::Wep => {
                conf.push_str("wep_default_key=0\n");
                conf.push_str(&format!("wep_key0=\"{}\"\n", password()?));
            }
            AuthMode::WpaPsk => {
                conf.push_str(&format!("wpa=1\nwpa_passphrase={}\n", password()?));
                conf.push_str("wpa_key_mgmt=WPA-PSK\nwpa_pairwise=TKIP\n");
            }
            AuthMode::Wpa2Psk => {
                conf.push_str(&format!("wpa=2\nwpa_passphrase={}\n", password()?));
                conf.push_str("wpa_key_mgmt=WPA-PSK\nrsn_pairwise=CCMP\n");
            }
            AuthMode::WpaWpa2Psk => {
                conf.push_str(&format!("wpa=3\nwpa_passphrase={}\n", password()?));
                conf.push_str("wpa_key_mgmt=WPA-PSK\nwpa_pairwise=TKIP CCMP\nrsn_pairwise=CCMP\n");
            }
            AuthMode::Wpa3Psk => {
                conf.push_str(&format!("wpa=2\nsae_password={}\n", password()?));
                conf.push_str("wpa_key_mgmt=SAE\nrsn_pairwise=CCMP\n");
                pmf = 2;
            }
            AuthMode::Wpa2Wpa3Psk => {
                let password = password()?;
                conf.push_str(&format!("wpa=2\nwpa_passphrase={}\nsae_password={}\n", password, password));
                conf.push_str("wpa_key_mgmt=WPA-PSK SAE\nrsn_pairwise=CCMP\n");
                pmf = pmf.max(1);
            }
            AuthMode::Wpa2Enterprise => {
                return Err(WifiCtlError::InvalidParameter(
                    "hostapd AP cannot present WPA2-Enterprise".to_string()
                ));
            }
        }

        if pmf > 0 {
            conf.push_str(&format!("ieee80211w={}\n", pmf));
        }

        conf.push_str("ieee80211n=1\nwmm_enabled=1\n");
        conf.push_str(&format!("max_num_sta={}\n", config.max_connections));
        conf.push_str("auth_algs=1\nmacaddr_acl=0\n");

        Ok(conf)
    }

    pub async fn write_config(&self, interface: &str, config: &ApConfig) -> WifiCtlResult<PathBuf> {
        let conf_content = self.generate_config(interface, config)?;
        let conf_path = self.config_dir.join("hostapd.conf");
        fs::create_dir_all(&self.config_dir).await?;
        fs::write(&conf_path, conf_content).await?;
        Ok(conf_path)
    }

    /// (Re)start hostapd with `config`
    pub async fn start(&self, interface: &str, config: &ApConfig) -> WifiCtlResult<()> {
        let conf_path = self.write_config(interface, config).await?;
        self.stop().await?;

        info!("Starting hostapd on {} for SSID={}", interface, config.ssid_lossy());
        let cmd_str = format!("hostapd -B -P {} {}", self.pid_file.display(), conf_path.display());
        let output = Command::new(&self.hostapd_bin)
            .arg("-B")
            .arg("-P").arg(&self.pid_file)
            .arg(&conf_path)
            .output()
            .await
            .map_err(|e| WifiCtlError::CommandFailed {
                cmd: cmd_str.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(WifiCtlError::CommandFailed {
                cmd: cmd_str,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        for _ in 0..10 {
            sleep(Duration::from_millis(200)).await;
            if self.is_running().await {
                return Ok(());
            }
        }

        Err(WifiCtlError::Driver(
            "hostapd process did not start successfully".to_string()
        ))
    }

    pub async fn stop(&self) -> WifiCtlResult<()> {
        let Some(pid) = self.running_pid().await else {
            return Ok(());
        };

        debug!("Stopping hostapd (pid {})", pid);
        // SAFETY: kill(2) only signals the process, no memory is touched
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        for _ in 0..10 {
            sleep(Duration::from_millis(200)).await;
            if !self.is_running().await {
                let _ = fs::remove_file(&self.pid_file).await;
                return Ok(());
            }
        }

        Err(WifiCtlError::Driver("hostapd did not stop".to_string()))
    }

    pub async fn is_running(&self) -> bool {
        self.running_pid().await.is_some()
    }

    async fn running_pid(&self) -> Option<i32> {
        let pid_str = fs::read_to_string(&self.pid_file).await.ok()?;
        let pid = pid_str.trim().parse::<i32>().ok()?;
        Path::new(&format!("/proc/{}", pid)).exists().then_some(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> HostapdController {
        HostapdController::new(PathBuf::from("/usr/sbin/hostapd"), PathBuf::from("/tmp/wifictl"))
    }

    fn wpa2() -> ApConfig {
        ApConfig {
            ssid: b"ManagementAP".to_vec(),
            password: Some("mgmtadmin".to_string()),
            channel: 1,
            max_connections: 1,
            auth_mode: AuthMode::Wpa2Psk,
            ..ApConfig::default()
        }
    }

    #[test]
    fn test_wpa2_config() {
        let conf = controller().generate_config("wlan0ap", &wpa2()).unwrap();
        assert!(conf.contains("interface=wlan0ap\n"));
        assert!(conf.contains("ssid=ManagementAP\n"));
        assert!(conf.contains("channel=1\n"));
        assert!(conf.contains("wpa=2\n"));
        assert!(conf.contains("wpa_passphrase=mgmtadmin\n"));
        assert!(conf.contains("max_num_sta=1\n"));
        assert!(!conf.contains("ignore_broadcast_ssid"));
        assert!(!conf.contains("ieee80211w"));
    }

    #[test]
    fn test_open_hidden_config() {
        let config = ApConfig {
            ssid: b"Cafe".to_vec(),
            hidden: true,
            ..ApConfig::default()
        };
        let conf = controller().generate_config("wlan0ap", &config).unwrap();
        assert!(conf.contains("ignore_broadcast_ssid=1\n"));
        assert!(!conf.contains("wpa="));
    }

    #[test]
    fn test_binary_ssid_uses_hex() {
        let config = ApConfig {
            ssid: vec![0xff, 0x00, 0x41],
            ..ApConfig::default()
        };
        let conf = controller().generate_config("wlan0ap", &config).unwrap();
        assert!(conf.contains("ssid2=ff0041\n"));
    }

    #[test]
    fn test_wpa3_forces_pmf() {
        let config = ApConfig {
            auth_mode: AuthMode::Wpa3Psk,
            ..wpa2()
        };
        let conf = controller().generate_config("wlan0ap", &config).unwrap();
        assert!(conf.contains("wpa_key_mgmt=SAE\n"));
        assert!(conf.contains("ieee80211w=2\n"));
    }

    #[test]
    fn test_secured_without_password_rejected() {
        let config = ApConfig {
            password: None,
            ..wpa2()
        };
        assert!(controller().generate_config("wlan0ap", &config).is_err());
    }

    #[test]
    fn test_enterprise_rejected() {
        let config = ApConfig {
            auth_mode: AuthMode::Wpa2Enterprise,
            ..wpa2()
        };
        assert!(matches!(
            controller().generate_config("wlan0ap", &config),
            Err(WifiCtlError::InvalidParameter(_))
        ));
    }
}

//! Linux radio backend
//!
//! The AP role lives on an `__ap` virtual interface created next to the
//! station interface and is served by hostapd. The station role is driven
//! through wpa_cli. A polling monitor turns wpa_supplicant state changes into
//! [`RadioEvent`]s.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{RadioDriver, RadioEvent};
use crate::config::LinuxSettings;
use crate::error::{WifiCtlError, WifiCtlResult};
use crate::hostapd::HostapdController;
use crate::types::{ApConfig, MacAddress, RadioMode, StaConfig, WifiInterface};
use crate::validation;
use crate::wpa_supplicant::{WpaStatus, WpaSupplicantController};

#[derive(Debug, Default)]
struct StaSession {
    config: Option<StaConfig>,
    network_id: Option<String>,
}

/// Radio driver backed by iw, ip, hostapd and wpa_cli
pub struct LinuxRadioDriver {
    settings: LinuxSettings,
    hostapd: HostapdController,
    wpa: Arc<WpaSupplicantController>,
    events: broadcast::Sender<RadioEvent>,
    mode: Mutex<RadioMode>,
    /// Last AP configuration hostapd was started with
    ap_config: Mutex<Option<ApConfig>>,
    sta: Mutex<StaSession>,
    monitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LinuxRadioDriver {
    pub fn new(settings: LinuxSettings) -> WifiCtlResult<Self> {
        validation::validate_interface_name(&settings.phy_interface)?;
        validation::validate_interface_name(&settings.ap_interface)?;

        let (events, _) = broadcast::channel(32);
        Ok(Self {
            hostapd: HostapdController::new(settings.hostapd_bin.clone(), settings.config_dir.clone()),
            wpa: Arc::new(WpaSupplicantController::new(settings.wpa_cli_bin.clone())),
            settings,
            events,
            mode: Mutex::new(RadioMode::Idle),
            ap_config: Mutex::new(None),
            sta: Mutex::new(StaSession::default()),
            monitor: std::sync::Mutex::new(None),
        })
    }

    fn interface(&self, interface: WifiInterface) -> &str {
        match interface {
            WifiInterface::Ap => &self.settings.ap_interface,
            WifiInterface::Sta => &self.settings.phy_interface,
        }
    }

    fn emit(&self, event: RadioEvent) {
        debug!("Radio event: {:?}", event);
        let _ = self.events.send(event);
    }

    async fn ap_interface_exists(&self) -> bool {
        fs::metadata(format!("/sys/class/net/{}", self.settings.ap_interface))
            .await
            .is_ok()
    }

    async fn ensure_ap_interface(&self) -> WifiCtlResult<()> {
        if self.ap_interface_exists().await {
            return Ok(());
        }
        info!(
            "Creating AP interface {} on {}",
            self.settings.ap_interface, self.settings.phy_interface
        );
        run_iw(&[
            "dev",
            &self.settings.phy_interface,
            "interface",
            "add",
            &self.settings.ap_interface,
            "type",
            "__ap",
        ])
        .await
        .map(|_| ())
    }

    async fn remove_ap_interface(&self) -> WifiCtlResult<()> {
        self.hostapd.stop().await?;
        if !self.ap_interface_exists().await {
            return Ok(());
        }
        run_iw(&["dev", &self.settings.ap_interface, "del"]).await.map(|_| ())
    }

    fn spawn_monitor(&self) {
        let Ok(mut slot) = self.monitor.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        let monitor = StatusMonitor {
            wpa: self.wpa.clone(),
            interface: self.settings.phy_interface.clone(),
            events: self.events.clone(),
            interval: Duration::from_millis(self.settings.status_poll_ms),
        };
        *slot = Some(tokio::spawn(monitor.run()));
    }
}

impl Drop for LinuxRadioDriver {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl RadioDriver for LinuxRadioDriver {
    async fn bring_up(&self) -> WifiCtlResult<()> {
        run_ip(&["link", "set", "dev", &self.settings.phy_interface, "up"]).await
    }

    async fn set_mode(&self, mode: RadioMode) -> WifiCtlResult<()> {
        match mode {
            RadioMode::ApOnly | RadioMode::ApSta => self.ensure_ap_interface().await?,
            RadioMode::Idle | RadioMode::StaOnly => self.remove_ap_interface().await?,
        }
        *self.mode.lock().await = mode;
        debug!("Radio mode set to {:?}", mode);
        Ok(())
    }

    async fn start(&self) -> WifiCtlResult<()> {
        let mode = *self.mode.lock().await;
        if matches!(mode, RadioMode::ApOnly | RadioMode::ApSta) {
            run_ip(&["link", "set", "dev", &self.settings.ap_interface, "up"]).await?;
        }
        self.spawn_monitor();
        if matches!(mode, RadioMode::StaOnly | RadioMode::ApSta) {
            self.emit(RadioEvent::StaStarted);
        }
        Ok(())
    }

    async fn set_ap_config(&self, config: &ApConfig) -> WifiCtlResult<()> {
        // hostapd has no zero-client setting; closing the AP stops it
        let mut applied = self.ap_config.lock().await;
        if config.max_connections == 0 {
            let was_running = self.hostapd.is_running().await;
            self.hostapd.stop().await?;
            *applied = None;
            if was_running {
                self.emit(RadioEvent::ApStopped);
            }
            return Ok(());
        }

        if let Err(e) = self.hostapd.start(&self.settings.ap_interface, config).await {
            // Bring the prior AP back so the rejected config leaves no trace
            if let Some(prior) = applied.as_ref() {
                warn!("Restoring prior AP SSID={}", prior.ssid_lossy());
                if let Err(restore) = self.hostapd.start(&self.settings.ap_interface, prior).await {
                    warn!("Failed to restore prior AP: {}", restore);
                    *applied = None;
                    self.emit(RadioEvent::ApStopped);
                }
            }
            return Err(e);
        }
        *applied = Some(config.clone());
        self.emit(RadioEvent::ApStarted);
        Ok(())
    }

    async fn set_sta_config(&self, config: &StaConfig) -> WifiCtlResult<()> {
        let interface = &self.settings.phy_interface;
        let mut sta = self.sta.lock().await;
        let network_id = self.wpa.add_network(interface, config).await?;
        if let Some(previous) = sta.network_id.replace(network_id) {
            if let Err(e) = self.wpa.remove_network(interface, &previous).await {
                warn!("Failed to remove previous network {}: {}", previous, e);
            }
        }
        sta.config = Some(config.clone());
        Ok(())
    }

    async fn mac(&self, interface: WifiInterface) -> WifiCtlResult<MacAddress> {
        let name = self.interface(interface);
        let output = run_ip_output(&["-json", "link", "show", "dev", name]).await?;
        parse_link_address(&output)
    }

    async fn set_mac(&self, interface: WifiInterface, mac: MacAddress) -> WifiCtlResult<()> {
        let name = self.interface(interface).to_string();
        let mac_str = mac.to_string();

        // hostapd must release the interface while its address changes
        let applied = self.ap_config.lock().await;
        let ap_running = self.hostapd.is_running().await;
        let restart = match (interface, applied.as_ref()) {
            (WifiInterface::Ap, Some(config)) if ap_running => {
                self.hostapd.stop().await?;
                Some(config)
            }
            _ => None,
        };

        run_ip(&["link", "set", "dev", &name, "down"]).await?;
        let changed = run_ip(&["link", "set", "dev", &name, "address", &mac_str]).await;
        run_ip(&["link", "set", "dev", &name, "up"]).await?;

        if let Some(config) = restart {
            debug!("Restarting hostapd after MAC change");
            self.hostapd.start(&self.settings.ap_interface, config).await?;
        }
        changed?;
        info!("{} MAC set to {}", interface, mac);
        Ok(())
    }

    async fn set_channel(&self, channel: u8) -> WifiCtlResult<()> {
        let channel_str = channel.to_string();
        run_iw(&["dev", &self.settings.phy_interface, "set", "channel", &channel_str])
            .await
            .map(|_| ())
    }

    async fn connect(&self) -> WifiCtlResult<()> {
        let sta = self.sta.lock().await;
        let (Some(config), Some(network_id)) = (sta.config.as_ref(), sta.network_id.as_deref()) else {
            return Err(WifiCtlError::InvalidState(
                "No station configuration applied".to_string()
            ));
        };
        debug!("Connecting station to {}", config.ssid_lossy());
        self.wpa
            .select_network(&self.settings.phy_interface, network_id)
            .await
    }

    async fn disconnect(&self) -> WifiCtlResult<()> {
        self.wpa.disconnect(&self.settings.phy_interface).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }
}

/// Events implied by moving from `previous` to `current`
pub fn status_events(previous: Option<&WpaStatus>, current: &WpaStatus) -> Vec<RadioEvent> {
    let mut events = Vec::new();
    let was_connected = previous.is_some_and(WpaStatus::is_connected);

    match (was_connected, current.is_connected()) {
        (false, true) => events.push(RadioEvent::StaConnected),
        (true, false) => events.push(RadioEvent::StaDisconnected { reason: None }),
        _ => {}
    }

    // Only a first sighting or a change of address counts as a new lease
    if current.is_connected() {
        let previous_ip = previous.and_then(|p| p.ip_address.as_deref());
        if let Some(ip) = current.ip_address.as_deref() {
            if previous_ip != Some(ip) || !was_connected {
                if let Ok(address) = ip.parse::<IpAddr>() {
                    events.push(RadioEvent::StaGotIp { address });
                }
            }
        }
    }

    events
}

struct StatusMonitor {
    wpa: Arc<WpaSupplicantController>,
    interface: String,
    events: broadcast::Sender<RadioEvent>,
    interval: Duration,
}

impl StatusMonitor {
    async fn run(self) {
        debug!("Station status monitor started on {}", self.interface);
        let mut previous: Option<WpaStatus> = None;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let current = match self.wpa.status(&self.interface).await {
                Ok(status) => status,
                Err(e) => {
                    debug!("Station status unavailable: {}", e);
                    continue;
                }
            };
            for event in status_events(previous.as_ref(), &current) {
                debug!("Radio event: {:?}", event);
                let _ = self.events.send(event);
            }
            previous = Some(current);
        }
    }
}

async fn run_iw(args: &[&str]) -> WifiCtlResult<String> {
    let cmd_str = format!("iw {}", args.join(" "));
    debug!("Running: {}", cmd_str);
    let output = Command::new("iw")
        .args(args)
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

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Hardware address from `ip -json link show` output
pub fn parse_link_address(json: &str) -> WifiCtlResult<MacAddress> {
    let links: serde_json::Value = serde_json::from_str(json)?;
    links
        .as_array()
        .and_then(|links| links.first())
        .and_then(|link| link.get("address"))
        .and_then(|address| address.as_str())
        .ok_or_else(|| WifiCtlError::Driver("No link address in ip output".to_string()))?
        .parse()
}

async fn run_ip(args: &[&str]) -> WifiCtlResult<()> {
    run_ip_output(args).await.map(|_| ())
}

async fn run_ip_output(args: &[&str]) -> WifiCtlResult<String> {
    let cmd_str = format!("ip {}", args.join(" "));
    debug!("Running: {}", cmd_str);
    let output = Command::new("ip")
        .args(args)
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

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

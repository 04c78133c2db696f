//! Radio controller
//!
//! Single authority over the radio's mode, MAC addresses and channel. The
//! radio runs in AP+STA mode from the first [`RadioController::initialize`]
//! onwards. Hardware events are turned into policy reactions by the pure
//! [`react`] function; the only policy is station auto-reconnect, suppressed
//! for a disconnect the controller itself requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MgmtApSettings;
use crate::driver::{RadioDriver, RadioEvent};
use crate::error::{WifiCtlError, WifiCtlResult};
use crate::types::{
    ApConfig, MacAddress, NetworkDescriptor, RadioMode, RadioState, ScanMethod, StaConfig,
    WifiInterface,
};
use crate::validation;

/// What the controller does in response to a hardware event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    None,
    Reconnect,
}

/// Controller state the event reactions depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReactionState {
    /// Set by an explicit disconnect, consumed by the next disconnect event
    pub suppress_reconnect: bool,
}

/// Decide the reaction to `event` given `state`.
pub fn react(state: ReactionState, event: &RadioEvent) -> (ReactionState, Reaction) {
    match event {
        RadioEvent::StaDisconnected { .. } if state.suppress_reconnect => (
            ReactionState {
                suppress_reconnect: false,
            },
            Reaction::None,
        ),
        RadioEvent::StaDisconnected { .. } => (state, Reaction::Reconnect),
        _ => (state, Reaction::None),
    }
}

fn log_event(event: &RadioEvent) {
    match event {
        RadioEvent::ApStarted => info!("AP started"),
        RadioEvent::ApStopped => info!("AP stopped"),
        RadioEvent::StaStarted => info!("STA started"),
        RadioEvent::StaConnected => info!("STA connected to AP"),
        RadioEvent::StaDisconnected { reason } => match reason {
            Some(code) => info!("STA disconnected from AP (reason {})", code),
            None => info!("STA disconnected from AP"),
        },
        RadioEvent::StaGotIp { address } => info!("STA got IP {}", address),
    }
}

/// Applies [`react`] against the shared suppression flag. Cloned into the
/// event loop task, so it holds only what reactions touch.
#[derive(Clone)]
struct EventReactor {
    driver: Arc<dyn RadioDriver>,
    suppress_reconnect: Arc<AtomicBool>,
}

impl EventReactor {
    async fn handle(&self, event: &RadioEvent) -> Reaction {
        log_event(event);

        // CAS so an explicit disconnect racing with this event is never lost
        let reaction = loop {
            let current = self.suppress_reconnect.load(Ordering::SeqCst);
            let (next, reaction) = react(
                ReactionState {
                    suppress_reconnect: current,
                },
                event,
            );
            if self
                .suppress_reconnect
                .compare_exchange(current, next.suppress_reconnect, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break reaction;
            }
        };

        match reaction {
            Reaction::Reconnect => {
                debug!("Auto-reconnecting station");
                if let Err(e) = self.driver.connect().await {
                    warn!("Auto-reconnect failed: {}", e);
                }
            }
            Reaction::None => {
                if matches!(event, RadioEvent::StaDisconnected { .. }) {
                    debug!("Disconnect was requested, not reconnecting");
                }
            }
        }

        reaction
    }

    async fn run(self, mut events: broadcast::Receiver<RadioEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Radio event loop lagged, {} events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Radio event channel closed");
                    break;
                }
            }
        }
    }
}

fn fatal(what: &'static str) -> impl FnOnce(WifiCtlError) -> WifiCtlError {
    move |e| match e {
        WifiCtlError::Fatal(_) => e,
        other => WifiCtlError::Fatal(format!("{}: {}", what, other)),
    }
}

/// Radio controller
pub struct RadioController {
    driver: Arc<dyn RadioDriver>,
    mgmt_ap: MgmtApSettings,
    state: Mutex<RadioState>,
    reactor: EventReactor,
    event_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RadioController {
    pub fn new(driver: Arc<dyn RadioDriver>, mgmt_ap: MgmtApSettings) -> Self {
        Self {
            reactor: EventReactor {
                driver: driver.clone(),
                suppress_reconnect: Arc::new(AtomicBool::new(false)),
            },
            driver,
            mgmt_ap,
            state: Mutex::new(RadioState::default()),
            event_task: std::sync::Mutex::new(None),
        }
    }

    /// Bring the radio up in AP+STA mode, start the event loop and record the
    /// original AP MAC. Runs once; later calls are no-ops. Any failure is fatal.
    pub async fn initialize(&self) -> WifiCtlResult<()> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await
    }

    async fn initialize_locked(&self, state: &mut RadioState) -> WifiCtlResult<()> {
        if state.initialized {
            return Ok(());
        }

        info!("Initializing radio in AP+STA mode");
        self.driver.bring_up().await.map_err(fatal("bring up radio"))?;
        self.driver
            .set_mode(RadioMode::ApSta)
            .await
            .map_err(fatal("set AP+STA mode"))?;

        // Subscribe before start so start notifications are not missed
        let events = self.driver.subscribe();

        let original = self
            .driver
            .mac(WifiInterface::Ap)
            .await
            .map_err(fatal("read AP MAC"))?;
        self.driver.start().await.map_err(fatal("start radio"))?;

        let task = tokio::spawn(self.reactor.clone().run(events));
        if let Ok(mut slot) = self.event_task.lock() {
            *slot = Some(task);
        }

        state.initialized = true;
        state.mode = RadioMode::ApSta;
        state.original_ap_mac = original;
        info!("Radio initialized, original AP MAC {}", original);
        Ok(())
    }

    /// Apply an AP configuration. A rejected configuration leaves the prior one
    /// in effect.
    pub async fn start_access_point(&self, config: &ApConfig) -> WifiCtlResult<()> {
        debug!("Starting AP...");
        validation::validate_ap_ssid(&config.ssid)?;
        validation::validate_channel(config.channel)?;
        if !config.auth_mode.is_open() {
            let password = config.password.as_deref().ok_or_else(|| {
                WifiCtlError::InvalidParameter("Password required for secured AP".to_string())
            })?;
            validation::validate_ap_password(password)?;
        }

        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        if let Err(e) = self.driver.set_ap_config(config).await {
            error!("Failed to set AP config: {}", e);
            return Err(WifiCtlError::ConfigRejected(e.to_string()));
        }

        state.ap_config = Some(config.clone());
        state.current_channel = config.channel;
        info!("AP started with SSID={}", config.ssid_lossy());
        Ok(())
    }

    /// Stop admitting clients by re-applying the current AP configuration with
    /// zero max connections. The interface stays up so channel and MAC are kept.
    pub async fn stop_access_point(&self) -> WifiCtlResult<()> {
        debug!("Stopping AP...");
        let mut state = self.state.lock().await;
        if !state.initialized {
            debug!("Radio not initialized, no AP to stop");
            return Ok(());
        }

        let closed = state
            .ap_config
            .as_ref()
            .map(ApConfig::closed)
            .unwrap_or_default();
        self.driver
            .set_ap_config(&closed)
            .await
            .map_err(fatal("apply closed AP config"))?;

        state.ap_config = Some(closed);
        debug!("AP stopped");
        Ok(())
    }

    /// Start the fixed-identity management AP
    pub async fn start_management_ap(&self) -> WifiCtlResult<()> {
        let config = self.mgmt_ap.ap_config();
        self.start_access_point(&config).await
    }

    /// Connect the station role to `target`. Only the connect request is
    /// issued here; the outcome arrives as radio events.
    pub async fn connect_station(
        &self,
        target: &NetworkDescriptor,
        password: Option<&str>,
    ) -> WifiCtlResult<()> {
        debug!("Connecting STA to AP...");
        if let Some(password) = password {
            validation::validate_sta_password(password).map_err(|e| {
                error!("{}", e);
                e
            })?;
        }
        target.validate()?;

        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        let config = StaConfig {
            ssid: target.ssid.clone(),
            password: password.map(str::to_string),
            channel: target.channel,
            scan_method: ScanMethod::Fast,
            pmf_capable: false,
            pmf_required: false,
        };
        debug!(".ssid={}", config.ssid_lossy());

        if let Err(e) = self.driver.set_sta_config(&config).await {
            error!("Failed to set STA config: {}", e);
            return Err(WifiCtlError::ConfigRejected(e.to_string()));
        }

        // An explicit connect supersedes a pending explicit disconnect
        self.reactor.suppress_reconnect.store(false, Ordering::SeqCst);
        self.driver.connect().await.map_err(fatal("issue station connect"))?;
        Ok(())
    }

    /// Disconnect the station without triggering auto-reconnect
    pub async fn disconnect_station(&self) -> WifiCtlResult<()> {
        let state = self.state.lock().await;
        if !state.initialized {
            return Err(WifiCtlError::InvalidState(
                "Radio not initialized".to_string()
            ));
        }

        debug!("Disconnecting STA...");
        // Must be visible before the disconnect event can arrive
        self.reactor.suppress_reconnect.store(true, Ordering::SeqCst);
        if let Err(e) = self.driver.disconnect().await {
            self.reactor.suppress_reconnect.store(false, Ordering::SeqCst);
            return Err(fatal("issue station disconnect")(e));
        }
        Ok(())
    }

    pub async fn set_ap_mac(&self, mac: MacAddress) -> WifiCtlResult<()> {
        if mac.is_multicast() {
            return Err(WifiCtlError::InvalidParameter(format!(
                "AP MAC must be unicast, got {}",
                mac
            )));
        }

        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        debug!("Changing AP MAC address to {}", mac);
        self.driver
            .set_mac(WifiInterface::Ap, mac)
            .await
            .map_err(fatal("set AP MAC"))
    }

    /// Revert the AP MAC to the value captured at initialization
    pub async fn restore_ap_mac(&self) -> WifiCtlResult<()> {
        let state = self.state.lock().await;
        if !state.initialized {
            return Err(WifiCtlError::InvalidState(
                "Radio not initialized, no original AP MAC".to_string()
            ));
        }

        debug!("Restoring original AP MAC address {}", state.original_ap_mac);
        self.driver
            .set_mac(WifiInterface::Ap, state.original_ap_mac)
            .await
            .map_err(fatal("restore AP MAC"))
    }

    pub async fn ap_mac(&self) -> WifiCtlResult<MacAddress> {
        self.interface_mac(WifiInterface::Ap).await
    }

    pub async fn sta_mac(&self) -> WifiCtlResult<MacAddress> {
        self.interface_mac(WifiInterface::Sta).await
    }

    async fn interface_mac(&self, interface: WifiInterface) -> WifiCtlResult<MacAddress> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;
        self.driver.mac(interface).await
    }

    /// MAC captured by the first initialization
    pub async fn original_ap_mac(&self) -> Option<MacAddress> {
        let state = self.state.lock().await;
        state.initialized.then_some(state.original_ap_mac)
    }

    /// Switch to `channel` (1..=13). Out-of-range input and driver failures
    /// leave the current channel unchanged.
    pub async fn set_channel(&self, channel: u8) -> WifiCtlResult<()> {
        validation::validate_channel(channel).map_err(|e| {
            error!("{}", e);
            e
        })?;

        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        if state.channel_locked && state.current_channel != channel {
            return Err(WifiCtlError::InvalidState(format!(
                "Channel locked to {} by an active attack",
                state.current_channel
            )));
        }

        self.apply_channel(&mut state, channel).await
    }

    /// Pin the radio to `channel` until [`release_channel`](Self::release_channel)
    pub async fn lock_channel(&self, channel: u8) -> WifiCtlResult<()> {
        validation::validate_channel(channel)?;

        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        if state.channel_locked && state.current_channel != channel {
            return Err(WifiCtlError::InvalidState(format!(
                "Channel already locked to {}",
                state.current_channel
            )));
        }

        self.apply_channel(&mut state, channel).await?;
        state.channel_locked = true;
        debug!("Channel locked to {}", channel);
        Ok(())
    }

    pub async fn release_channel(&self) {
        let mut state = self.state.lock().await;
        if state.channel_locked {
            debug!("Channel lock on {} released", state.current_channel);
        }
        state.channel_locked = false;
    }

    async fn apply_channel(&self, state: &mut RadioState, channel: u8) -> WifiCtlResult<()> {
        if let Err(e) = self.driver.set_channel(channel).await {
            error!("Failed to set channel {}: {}", channel, e);
            return Err(e);
        }
        state.current_channel = channel;
        Ok(())
    }

    /// Return to idle dual mode: no channel lock, AP+STA
    pub async fn reset_to_idle(&self) -> WifiCtlResult<()> {
        let mut state = self.state.lock().await;
        state.channel_locked = false;
        if !state.initialized {
            return Ok(());
        }

        if state.mode != RadioMode::ApSta {
            self.driver
                .set_mode(RadioMode::ApSta)
                .await
                .map_err(fatal("restore AP+STA mode"))?;
            state.mode = RadioMode::ApSta;
        }
        Ok(())
    }

    /// Snapshot of the current radio state
    pub async fn state(&self) -> RadioState {
        self.state.lock().await.clone()
    }

    /// Run the reaction for one hardware event. The event loop calls this for
    /// every driver notification.
    pub async fn handle_event(&self, event: &RadioEvent) -> Reaction {
        self.reactor.handle(event).await
    }

    /// Whether the next disconnect event will be swallowed
    pub fn reconnect_suppressed(&self) -> bool {
        self.reactor.suppress_reconnect.load(Ordering::SeqCst)
    }
}

impl Drop for RadioController {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.event_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

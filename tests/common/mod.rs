//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use libwifictl::{
    ApConfig, FrameCapabilities, MacAddress, RadioDriver, RadioEvent, RadioMode, StaConfig,
    WifiCtlError, WifiCtlResult, WifiInterface,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

pub const FACTORY_AP_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const FACTORY_STA_MAC: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
pub const TARGET_BSSID: MacAddress = MacAddress([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);

/// Driver operations, for recording and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    BringUp,
    SetMode,
    Start,
    SetApConfig,
    SetStaConfig,
    Mac,
    SetMac,
    SetChannel,
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    BringUp,
    SetMode(RadioMode),
    Start,
    SetApConfig(ApConfig),
    SetStaConfig(StaConfig),
    SetMac(WifiInterface, MacAddress),
    SetChannel(u8),
    Connect,
    Disconnect,
}

/// Radio driver that records every call and keeps MACs in memory
pub struct FakeDriver {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<Op>>,
    macs: Mutex<HashMap<WifiInterface, MacAddress>>,
    events: broadcast::Sender<RadioEvent>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        let macs = HashMap::from([
            (WifiInterface::Ap, FACTORY_AP_MAC),
            (WifiInterface::Sta, FACTORY_STA_MAC),
        ]);
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            macs: Mutex::new(macs),
            events,
        }
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    pub fn emit(&self, event: RadioEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect))
    }

    pub fn ap_configs(&self) -> Vec<ApConfig> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::SetApConfig(config) => Some(config.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn current_mac(&self, interface: WifiInterface) -> MacAddress {
        self.macs.lock().unwrap()[&interface]
    }

    fn record(&self, op: Op, call: Option<Call>) -> WifiCtlResult<()> {
        if let Some(call) = call {
            self.calls.lock().unwrap().push(call);
        }
        if self.failing.lock().unwrap().contains(&op) {
            return Err(WifiCtlError::Driver(format!("{:?} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl RadioDriver for FakeDriver {
    async fn bring_up(&self) -> WifiCtlResult<()> {
        self.record(Op::BringUp, Some(Call::BringUp))
    }

    async fn set_mode(&self, mode: RadioMode) -> WifiCtlResult<()> {
        self.record(Op::SetMode, Some(Call::SetMode(mode)))
    }

    async fn start(&self) -> WifiCtlResult<()> {
        self.record(Op::Start, Some(Call::Start))
    }

    async fn set_ap_config(&self, config: &ApConfig) -> WifiCtlResult<()> {
        self.record(Op::SetApConfig, Some(Call::SetApConfig(config.clone())))
    }

    async fn set_sta_config(&self, config: &StaConfig) -> WifiCtlResult<()> {
        self.record(Op::SetStaConfig, Some(Call::SetStaConfig(config.clone())))
    }

    async fn mac(&self, interface: WifiInterface) -> WifiCtlResult<MacAddress> {
        self.record(Op::Mac, None)?;
        Ok(self.current_mac(interface))
    }

    async fn set_mac(&self, interface: WifiInterface, mac: MacAddress) -> WifiCtlResult<()> {
        self.record(Op::SetMac, Some(Call::SetMac(interface, mac)))?;
        self.macs.lock().unwrap().insert(interface, mac);
        Ok(())
    }

    async fn set_channel(&self, channel: u8) -> WifiCtlResult<()> {
        self.record(Op::SetChannel, Some(Call::SetChannel(channel)))
    }

    async fn connect(&self) -> WifiCtlResult<()> {
        self.record(Op::Connect, Some(Call::Connect))
    }

    async fn disconnect(&self) -> WifiCtlResult<()> {
        self.record(Op::Disconnect, Some(Call::Disconnect))
    }

    fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }
}

/// Frame capabilities with a scripted receive queue and a transmit log.
/// Frames registered with `answer_deauth` are queued once a deauth to that
/// destination goes out.
#[derive(Default)]
pub struct FakeFrames {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    arrived: Notify,
    transmitted: Mutex<Vec<Vec<u8>>>,
    answers: Mutex<HashMap<MacAddress, Vec<Vec<u8>>>>,
    capture_channel: Mutex<Option<u8>>,
    capture_starts: AtomicUsize,
    capture_stops: AtomicUsize,
    fail_start: AtomicBool,
}

impl FakeFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Vec<u8>) {
        self.inbox.lock().unwrap().push_back(frame);
        self.arrived.notify_one();
    }

    pub fn answer_deauth(&self, destination: MacAddress, frames: Vec<Vec<u8>>) {
        self.answers.lock().unwrap().insert(destination, frames);
    }

    pub fn fail_start_capture(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.transmitted.lock().unwrap().clone()
    }

    pub fn transmit_count(&self) -> usize {
        self.transmitted.lock().unwrap().len()
    }

    /// Destinations (addr1) of transmitted frames, in order
    pub fn destinations(&self) -> Vec<MacAddress> {
        self.transmitted()
            .iter()
            .map(|f| MacAddress::from_slice(&f[4..10]).unwrap())
            .collect()
    }

    pub fn capturing_on(&self) -> Option<u8> {
        *self.capture_channel.lock().unwrap()
    }

    pub fn capture_starts(&self) -> usize {
        self.capture_starts.load(Ordering::SeqCst)
    }

    pub fn capture_stops(&self) -> usize {
        self.capture_stops.load(Ordering::SeqCst)
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.inbox.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl FrameCapabilities for FakeFrames {
    async fn start_capture(&self, channel: u8) -> WifiCtlResult<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(WifiCtlError::Capture("monitor mode unavailable".to_string()));
        }
        self.capture_starts.fetch_add(1, Ordering::SeqCst);
        *self.capture_channel.lock().unwrap() = Some(channel);
        Ok(())
    }

    async fn stop_capture(&self) -> WifiCtlResult<()> {
        self.capture_stops.fetch_add(1, Ordering::SeqCst);
        *self.capture_channel.lock().unwrap() = None;
        Ok(())
    }

    async fn next_frame(&self, timeout: Duration) -> WifiCtlResult<Option<Vec<u8>>> {
        if let Some(frame) = self.pop() {
            return Ok(Some(frame));
        }
        let _ = tokio::time::timeout(timeout, self.arrived.notified()).await;
        Ok(self.pop())
    }

    async fn transmit(&self, frame: &[u8]) -> WifiCtlResult<()> {
        self.transmitted.lock().unwrap().push(frame.to_vec());
        let destination = MacAddress::from_slice(&frame[4..10])?;
        let answer = self.answers.lock().unwrap().remove(&destination);
        if let Some(frames) = answer {
            for frame in frames {
                self.push(frame);
            }
        }
        Ok(())
    }
}

/// Data frame carrying handshake `message` between `bssid` and `client`
pub fn handshake_frame(bssid: MacAddress, client: MacAddress, message: u8, replay_counter: u64) -> Vec<u8> {
    const SNAP: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];
    let from_ap = message % 2 == 1;

    let mut frame = vec![0x08, if from_ap { 0x02 } else { 0x01 }, 0, 0];
    if from_ap {
        frame.extend_from_slice(client.as_bytes());
        frame.extend_from_slice(bssid.as_bytes());
    } else {
        frame.extend_from_slice(bssid.as_bytes());
        frame.extend_from_slice(client.as_bytes());
    }
    frame.extend_from_slice(bssid.as_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&SNAP);

    // Pairwise, descriptor version 2
    let key_info: u16 = match message {
        1 => 0x008a,
        2 => 0x010a,
        3 => 0x13ca,
        _ => 0x030a,
    };
    let mut eapol = vec![0u8; 99];
    eapol[0] = 2;
    eapol[1] = 3;
    eapol[2..4].copy_from_slice(&95u16.to_be_bytes());
    eapol[4] = 2;
    eapol[5..7].copy_from_slice(&key_info.to_be_bytes());
    eapol[9..17].copy_from_slice(&replay_counter.to_be_bytes());
    frame.extend_from_slice(&eapol);
    frame
}

/// Protected data frame from `client` to `bssid`
pub fn client_data_frame(bssid: MacAddress, client: MacAddress) -> Vec<u8> {
    let mut frame = vec![0x08, 0x41, 0, 0];
    frame.extend_from_slice(bssid.as_bytes());
    frame.extend_from_slice(client.as_bytes());
    frame.extend_from_slice(bssid.as_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&[0u8; 16]);
    frame
}

pub fn client(n: u8) -> MacAddress {
    MacAddress([0xaa, 0xbb, 0xcc, 0x00, 0x00, n])
}

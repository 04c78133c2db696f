//! Four-way handshake detection and client discovery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::frames::{subtype, EapolKey, FrameType, Ieee80211Frame};
use crate::types::MacAddress;

/// A captured handshake between the target AP and one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub bssid: MacAddress,
    pub client: MacAddress,
    /// Message numbers seen, ascending
    pub messages: Vec<u8>,
    /// Raw frames of those messages, same order
    pub frames: Vec<Vec<u8>>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ClientExchange {
    /// Message number -> (replay counter, raw frame)
    messages: HashMap<u8, (u64, Vec<u8>)>,
}

impl ClientExchange {
    fn record(&mut self, key: &EapolKey, raw: &[u8]) {
        // A fresh message 1 starts a new exchange
        if key.message == 1 {
            self.messages.clear();
        }
        self.messages.insert(key.message, (key.replay_counter, raw.to_vec()));
    }

    /// Message 2 paired with message 1 (same replay counter) or with
    /// message 3 (the following counter).
    fn is_complete(&self) -> bool {
        let Some((m2_counter, _)) = self.messages.get(&2) else {
            return false;
        };
        let pairs_m1 = self.messages.get(&1).is_some_and(|(c, _)| c == m2_counter);
        let pairs_m3 = self
            .messages
            .get(&3)
            .is_some_and(|(c, _)| *c == m2_counter.wrapping_add(1));
        pairs_m1 || pairs_m3
    }
}

/// Per-client EAPOL bookkeeping for one BSSID
#[derive(Debug)]
pub struct HandshakeTracker {
    bssid: MacAddress,
    exchanges: HashMap<MacAddress, ClientExchange>,
}

impl HandshakeTracker {
    pub fn new(bssid: MacAddress) -> Self {
        Self {
            bssid,
            exchanges: HashMap::new(),
        }
    }

    /// Record an EAPOL-Key from `client`; returns the handshake once it is complete
    pub fn record(&mut self, client: MacAddress, key: &EapolKey, raw: &[u8]) -> Option<Handshake> {
        debug!("EAPOL message {} between {} and {}", key.message, self.bssid, client);
        let exchange = self.exchanges.entry(client).or_default();
        exchange.record(key, raw);
        if !exchange.is_complete() {
            return None;
        }

        let mut messages: Vec<u8> = exchange.messages.keys().copied().collect();
        messages.sort_unstable();
        let frames = messages
            .iter()
            .filter_map(|m| exchange.messages.get(m).map(|(_, raw)| raw.clone()))
            .collect();
        self.exchanges.remove(&client);

        Some(Handshake {
            bssid: self.bssid,
            client,
            messages,
            frames,
            captured_at: Utc::now(),
        })
    }
}

/// What a single frame told us about the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    ClientDiscovered(MacAddress),
    HandshakeCaptured(Handshake),
}

/// Watches captured frames of one target network
#[derive(Debug)]
pub struct FrameAnalyzer {
    bssid: MacAddress,
    tracker: HandshakeTracker,
    clients: Vec<MacAddress>,
}

impl FrameAnalyzer {
    pub fn new(bssid: MacAddress) -> Self {
        Self {
            bssid,
            tracker: HandshakeTracker::new(bssid),
            clients: Vec::new(),
        }
    }

    /// Seed clients known before capture started
    pub fn with_known_clients(mut self, clients: impl IntoIterator<Item = MacAddress>) -> Self {
        for client in clients {
            self.note_client(client);
        }
        self
    }

    /// Clients in discovery order
    pub fn clients(&self) -> &[MacAddress] {
        &self.clients
    }

    fn note_client(&mut self, client: MacAddress) -> bool {
        if client.is_multicast() || client == self.bssid || self.clients.contains(&client) {
            return false;
        }
        self.clients.push(client);
        true
    }

    /// Inspect one raw frame. Frames that do not belong to the target or fail
    /// to parse are ignored.
    pub fn observe(&mut self, raw: &[u8]) -> Vec<Observation> {
        let mut observations = Vec::new();
        let Ok(frame) = Ieee80211Frame::parse(raw) else {
            return observations;
        };
        if frame.bssid() != Some(self.bssid) {
            return observations;
        }

        let station = match frame.frame_type {
            FrameType::Data => frame.station(),
            FrameType::Management
                if frame.subtype == subtype::ASSOC_REQUEST
                    || frame.subtype == subtype::REASSOC_REQUEST =>
            {
                Some(frame.addr2)
            }
            _ => None,
        };
        let Some(station) = station else {
            return observations;
        };

        if self.note_client(station) {
            info!("Discovered client {} of {}", station, self.bssid);
            observations.push(Observation::ClientDiscovered(station));
        }

        if let Some(key) = frame.eapol().and_then(EapolKey::parse) {
            if let Some(handshake) = self.tracker.record(station, &key, raw) {
                info!(
                    "Handshake captured between {} and {} (messages {:?})",
                    handshake.bssid, handshake.client, handshake.messages
                );
                observations.push(Observation::HandshakeCaptured(handshake));
            }
        }

        observations
    }
}

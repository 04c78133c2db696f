//! 802.11 frame building and parsing
//!
//! Frames are raw 802.11 MAC frames without radiotap or FCS.

use crate::error::{WifiCtlError, WifiCtlResult};
use crate::types::MacAddress;

/// Deauthentication frame length: 24-byte header plus reason code
pub const DEAUTH_FRAME_LEN: usize = 26;

/// LLC/SNAP header announcing an EAPOL payload (ethertype 0x888E)
const EAPOL_SNAP: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];

/// EAPOL packet type for EAPOL-Key
const EAPOL_KEY: u8 = 3;

/// EAPOL header (4) + descriptor type (1) + key info (2) + key length (2) +
/// replay counter (8) + nonce (32) + IV (16) + RSC (8) + ID (8) + MIC (16) +
/// key data length (2)
const EAPOL_KEY_MIN_LEN: usize = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Extension,
}

impl FrameType {
    fn from_frame_control(fc: u16) -> Self {
        match (fc >> 2) & 0x3 {
            0 => FrameType::Management,
            1 => FrameType::Control,
            2 => FrameType::Data,
            _ => FrameType::Extension,
        }
    }
}

/// Management subtypes the analyzer cares about
pub mod subtype {
    pub const ASSOC_REQUEST: u8 = 0;
    pub const REASSOC_REQUEST: u8 = 2;
    pub const DEAUTH: u8 = 12;
}

/// Deauthentication frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeauthFrame {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub bssid: MacAddress,
    pub reason: u16,
    pub sequence: u16,
}

impl DeauthFrame {
    pub fn new(destination: MacAddress, source: MacAddress, bssid: MacAddress, reason: u16) -> Self {
        Self {
            destination,
            source,
            bssid,
            reason,
            sequence: 0,
        }
    }

    /// AP-spoofed deauth to every associated client
    pub fn broadcast(bssid: MacAddress, reason: u16) -> Self {
        Self::new(MacAddress::BROADCAST, bssid, bssid, reason)
    }

    /// AP-spoofed deauth to one client
    pub fn from_ap(bssid: MacAddress, client: MacAddress, reason: u16) -> Self {
        Self::new(client, bssid, bssid, reason)
    }

    /// Client-spoofed deauth to the AP
    pub fn from_client(bssid: MacAddress, client: MacAddress, reason: u16) -> Self {
        Self::new(bssid, client, bssid, reason)
    }

    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence & 0x0fff;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(DEAUTH_FRAME_LEN);
        // Frame control: management, subtype deauth
        frame.extend_from_slice(&[subtype::DEAUTH << 4, 0x00]);
        // Duration 314us
        frame.extend_from_slice(&[0x3a, 0x01]);
        frame.extend_from_slice(self.destination.as_bytes());
        frame.extend_from_slice(self.source.as_bytes());
        frame.extend_from_slice(self.bssid.as_bytes());
        frame.extend_from_slice(&(self.sequence << 4).to_le_bytes());
        frame.extend_from_slice(&self.reason.to_le_bytes());
        frame
    }
}

/// Parsed view of a captured frame
#[derive(Debug, Clone)]
pub struct Ieee80211Frame<'a> {
    pub frame_type: FrameType,
    pub subtype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
    pub protected: bool,
    pub addr1: MacAddress,
    pub addr2: MacAddress,
    pub addr3: MacAddress,
    header_len: usize,
    raw: &'a [u8],
}

impl<'a> Ieee80211Frame<'a> {
    pub fn parse(data: &'a [u8]) -> WifiCtlResult<Self> {
        if data.len() < 24 {
            return Err(WifiCtlError::Capture(format!(
                "Frame too short: {} bytes",
                data.len()
            )));
        }

        let fc = u16::from_le_bytes([data[0], data[1]]);
        let frame_type = FrameType::from_frame_control(fc);
        let subtype = ((fc >> 4) & 0xf) as u8;
        let flags = data[1];
        let to_ds = flags & 0x01 != 0;
        let from_ds = flags & 0x02 != 0;

        let mut header_len = 24;
        if frame_type == FrameType::Data {
            if to_ds && from_ds {
                header_len += 6;
            }
            // QoS data subtypes carry a 2-byte QoS control field
            if subtype & 0x8 != 0 {
                header_len += 2;
            }
        }
        if data.len() < header_len {
            return Err(WifiCtlError::Capture("Truncated 802.11 header".to_string()));
        }

        Ok(Self {
            frame_type,
            subtype,
            to_ds,
            from_ds,
            protected: flags & 0x40 != 0,
            addr1: MacAddress::from_slice(&data[4..10])?,
            addr2: MacAddress::from_slice(&data[10..16])?,
            addr3: MacAddress::from_slice(&data[16..22])?,
            header_len,
            raw: data,
        })
    }

    /// BSSID per the ToDS/FromDS address layout, None for WDS frames
    pub fn bssid(&self) -> Option<MacAddress> {
        match (self.to_ds, self.from_ds) {
            (false, false) => Some(self.addr3),
            (true, false) => Some(self.addr1),
            (false, true) => Some(self.addr2),
            (true, true) => None,
        }
    }

    /// Station on the far side of the BSSID for infrastructure data frames
    pub fn station(&self) -> Option<MacAddress> {
        match (self.to_ds, self.from_ds) {
            (true, false) => Some(self.addr2),
            (false, true) => Some(self.addr1),
            _ => None,
        }
    }

    pub fn body(&self) -> &'a [u8] {
        &self.raw[self.header_len..]
    }

    /// EAPOL payload of an unprotected data frame
    pub fn eapol(&self) -> Option<&'a [u8]> {
        if self.frame_type != FrameType::Data || self.protected {
            return None;
        }
        let body = self.body();
        if body.len() < EAPOL_SNAP.len() || body[..EAPOL_SNAP.len()] != EAPOL_SNAP {
            return None;
        }
        Some(&body[EAPOL_SNAP.len()..])
    }
}

/// WPA key information field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo(pub u16);

impl KeyInfo {
    pub fn is_pairwise(&self) -> bool {
        self.0 & 0x0008 != 0
    }

    pub fn install(&self) -> bool {
        self.0 & 0x0040 != 0
    }

    pub fn ack(&self) -> bool {
        self.0 & 0x0080 != 0
    }

    pub fn mic(&self) -> bool {
        self.0 & 0x0100 != 0
    }

    pub fn secure(&self) -> bool {
        self.0 & 0x0200 != 0
    }

    /// Four-way handshake message number, None for anything else
    pub fn message_number(&self) -> Option<u8> {
        if !self.is_pairwise() {
            return None;
        }
        match (self.ack(), self.mic(), self.install(), self.secure()) {
            (true, false, false, _) => Some(1),
            (false, true, false, false) => Some(2),
            (true, true, true, _) => Some(3),
            (false, true, false, true) => Some(4),
            _ => None,
        }
    }
}

/// One EAPOL-Key frame of a four-way handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolKey {
    pub message: u8,
    pub key_info: KeyInfo,
    pub replay_counter: u64,
    pub nonce: [u8; 32],
}

impl EapolKey {
    pub fn parse(eapol: &[u8]) -> Option<Self> {
        if eapol.len() < EAPOL_KEY_MIN_LEN || eapol[1] != EAPOL_KEY {
            return None;
        }
        let key_info = KeyInfo(u16::from_be_bytes([eapol[5], eapol[6]]));
        let message = key_info.message_number()?;

        let mut counter = [0u8; 8];
        counter.copy_from_slice(&eapol[9..17]);
        let mut nonce = [0u8; 32];
        nonce.copy_from_slice(&eapol[17..49]);

        Some(Self {
            message,
            key_info,
            replay_counter: u64::from_be_bytes(counter),
            nonce,
        })
    }
}

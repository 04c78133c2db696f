//! wifictl - WiFi radio and handshake capture control library
//!
//! Async control of a shared 2.4GHz radio providing:
//! - Dual AP+STA operation with a fixed-identity management AP
//! - Station connect/disconnect with auto-reconnect suppression
//! - AP MAC spoofing and restore, channel locking
//! - WPA handshake capture (passive, broadcast deauth, rogue AP, sequential deauth)
//!
//! The Linux backend drives the radio through iw, ip, hostapd and wpa_cli.

pub mod error;
pub mod validation;
pub mod types;
pub mod config;
pub mod driver;
pub mod hostapd;
pub mod wpa_supplicant;
pub mod radio;
pub mod frames;
pub mod handshake;
pub mod cancel;
pub mod capture;
pub mod attack;

// Re-export commonly used types
pub use error::{WifiCtlError, WifiCtlResult};
pub use types::{
    ApConfig, AuthMode, MacAddress, NetworkDescriptor, RadioMode, RadioState,
    ScanMethod, StaConfig, WifiInterface,
};
pub use config::{AttackSettings, LinuxSettings, MgmtApSettings, WifiCtlConfig};
pub use driver::{LinuxRadioDriver, RadioDriver, RadioEvent};
pub use radio::{react, RadioController, Reaction, ReactionState};
pub use frames::{DeauthFrame, EapolKey, Ieee80211Frame};
pub use handshake::{FrameAnalyzer, Handshake, HandshakeTracker, Observation};
pub use cancel::StopSignal;
pub use capture::FrameCapabilities;
pub use attack::{
    AttackConfig, AttackEvent, AttackMethod, AttackOrchestrator, AttackStatus, ClientQueue,
};

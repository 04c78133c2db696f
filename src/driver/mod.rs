//! Radio driver seam
//!
//! The controller drives the physical radio only through [`RadioDriver`].
//! Drivers publish asynchronous hardware notifications as [`RadioEvent`]s on
//! a broadcast channel.

pub mod linux;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::sync::broadcast;

use crate::error::WifiCtlResult;
use crate::types::{ApConfig, MacAddress, RadioMode, StaConfig, WifiInterface};

pub use linux::LinuxRadioDriver;

/// Hardware notifications delivered by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEvent {
    ApStarted,
    ApStopped,
    StaStarted,
    StaConnected,
    StaDisconnected { reason: Option<u16> },
    StaGotIp { address: IpAddr },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioDriver: Send + Sync {
    /// Bring the radio subsystem up
    async fn bring_up(&self) -> WifiCtlResult<()>;

    async fn set_mode(&self, mode: RadioMode) -> WifiCtlResult<()>;

    /// Start the radio in the current mode
    async fn start(&self) -> WifiCtlResult<()>;

    async fn set_ap_config(&self, config: &ApConfig) -> WifiCtlResult<()>;

    async fn set_sta_config(&self, config: &StaConfig) -> WifiCtlResult<()>;

    async fn mac(&self, interface: WifiInterface) -> WifiCtlResult<MacAddress>;

    async fn set_mac(&self, interface: WifiInterface, mac: MacAddress) -> WifiCtlResult<()>;

    async fn set_channel(&self, channel: u8) -> WifiCtlResult<()>;

    /// Issue a station connect with the applied STA config
    async fn connect(&self) -> WifiCtlResult<()>;

    async fn disconnect(&self) -> WifiCtlResult<()>;

    /// Subscribe to hardware notifications
    fn subscribe(&self) -> broadcast::Receiver<RadioEvent>;
}

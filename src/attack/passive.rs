//! Passive: receive only on the target channel

use tracing::{debug, info};

use super::StrategyContext;
use crate::capture::ListenOutcome;

pub(super) async fn run(ctx: StrategyContext) {
    info!("Passively listening for handshakes on channel {}", ctx.target.channel);
    let mut analyzer = ctx.analyzer();
    let outcome = ctx
        .window()
        .listen(&mut analyzer, None, |observation| ctx.observe(observation))
        .await;

    match outcome {
        ListenOutcome::Handshake(handshake) => ctx.captured(handshake),
        ListenOutcome::Stopped | ListenOutcome::Elapsed => {
            debug!("Passive capture finished");
        }
    }
}

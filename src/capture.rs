//! Raw frame capture and injection seam
//!
//! The frame capabilities are provided by the platform; the strategies only
//! transmit finished frames and pull captured ones.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::cancel::StopSignal;
use crate::error::WifiCtlResult;
use crate::handshake::{FrameAnalyzer, Handshake, Observation};

#[async_trait]
pub trait FrameCapabilities: Send + Sync {
    /// Enter receive mode on `channel`
    async fn start_capture(&self, channel: u8) -> WifiCtlResult<()>;

    async fn stop_capture(&self) -> WifiCtlResult<()>;

    /// Next captured frame, None if nothing arrived within `timeout`
    async fn next_frame(&self, timeout: Duration) -> WifiCtlResult<Option<Vec<u8>>>;

    /// Inject one raw 802.11 frame
    async fn transmit(&self, frame: &[u8]) -> WifiCtlResult<()>;
}

/// Outcome of one capture window
#[derive(Debug)]
pub enum ListenOutcome {
    Handshake(Handshake),
    Elapsed,
    Stopped,
}

/// Feeds captured frames into an analyzer
pub struct CaptureWindow<'a> {
    pub frames: &'a dyn FrameCapabilities,
    pub stop: &'a StopSignal,
    /// Longest single receive wait
    pub slice: Duration,
}

impl CaptureWindow<'_> {
    /// Capture for `duration` (forever when None). Every observation is handed
    /// to `on_observation`; returns early on a handshake or stop.
    pub async fn listen<F>(
        &self,
        analyzer: &mut FrameAnalyzer,
        duration: Option<Duration>,
        mut on_observation: F,
    ) -> ListenOutcome
    where
        F: FnMut(&Observation) + Send,
    {
        let deadline = duration.map(|d| Instant::now() + d);
        loop {
            if self.stop.is_stopped() {
                return ListenOutcome::Stopped;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ListenOutcome::Elapsed;
                    }
                    self.slice.min(deadline - now)
                }
                None => self.slice,
            };

            let received = tokio::select! {
                _ = self.stop.stopped() => return ListenOutcome::Stopped,
                received = self.frames.next_frame(wait) => received,
            };

            match received {
                Ok(Some(raw)) => {
                    for observation in analyzer.observe(&raw) {
                        on_observation(&observation);
                        if let Observation::HandshakeCaptured(handshake) = observation {
                            return ListenOutcome::Handshake(handshake);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Frame capture error: {}", e);
                    // Keep a failing capture from spinning
                    if self.stop.sleep(wait).await {
                        return ListenOutcome::Stopped;
                    }
                }
            }
        }
    }
}

//! Idle Reaper
//!
//! Background loop that periodically asks the sequencer to drop client
//! queues nobody has used for the grace period. It never touches the
//! registry itself.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::SequencerHandle;

pub struct IdleReaper {
    handle: SequencerHandle,
    interval: Duration,
    shutdown: CancellationToken,
}

impl IdleReaper {
    pub fn new(handle: SequencerHandle, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            handle,
            interval,
            shutdown,
        }
    }

    /// Run until cancelled or the sequencer stops
    pub async fn run(self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting idle reaper"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("Requesting idle queue reap");
                    if !self.handle.request_reap() {
                        break;
                    }
                }
            }
        }

        info!("Idle reaper stopped");
    }
}

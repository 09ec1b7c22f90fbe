//! Periodic driver for `run_pd_client`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pd_mgr::PdMgr;
use crate::prober::PdWaker;

/// Runs `run_pd_client` every `interval` and whenever the waker fires.
pub struct PdDriver {
    mgr: Arc<PdMgr>,
    waker: PdWaker,
    interval: Duration,
}

impl PdDriver {
    pub fn new(mgr: Arc<PdMgr>, waker: PdWaker, interval: Duration) -> Self {
        Self {
            mgr,
            waker,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "PD driver started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.waker.woken() => debug!("Woken for an early tick"),
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.mgr.run_pd_client().await {
                warn!(error = %e, "run_pd_client failed, retrying on next tick");
            }
        }
        info!("PD driver stopped");
    }
}

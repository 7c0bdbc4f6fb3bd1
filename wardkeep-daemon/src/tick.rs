//! Background tick loop.
//!
//! A single tokio task wakes on a fixed interval and lets the plugin
//! manager run every module whose own tick interval has elapsed. Ticks are
//! the only host-initiated entry into a plugin; there is no push channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::plugin::PluginManager;

/// Drives periodic plugin ticks until shut down.
pub struct TickScheduler {
    manager: Arc<Mutex<PluginManager>>,
    period: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl TickScheduler {
    /// `period_seconds` is the scheduler's own wake-up cadence; each
    /// plugin's manifest interval is honored on top of it.
    pub fn new(manager: Arc<Mutex<PluginManager>>, period_seconds: u64) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            manager,
            period: Duration::from_secs(period_seconds.max(1)),
            shutdown_tx,
        }
    }

    /// Spawn the loop.
    pub fn start(&self) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let period = self.period;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick of tokio's interval fires immediately; skip it
            // so plugins settle before their first scheduled pass.
            ticker.tick().await;

            info!("Tick scheduler running every {:?}", period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let ran = manager.lock().await.tick_due();
                        if ran > 0 {
                            debug!("Ticked {} plugin(s)", ran);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Tick scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Signal the loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

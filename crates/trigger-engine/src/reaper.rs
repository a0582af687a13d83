//! Poller reaper
//!
//! A single task that owns every live poller handle. It accepts new
//! handles over a bounded channel, waits for pollers to complete, and
//! finishes the removal of triggers whose pollers exited in DELETING.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use shared::{Trigger, TriggerState, TriggerStore};

/// How long the reaper sleeps when idle, and the upper bound on one wait
/// for a poller completion
const REAPER_WAIT: Duration = Duration::from_secs(10);

pub struct Reaper {
    tasks: mpsc::Receiver<JoinHandle<Trigger>>,
    store: Arc<dyn TriggerStore>,
    shutdown: CancellationToken,
}

impl Reaper {
    pub fn new(
        tasks: mpsc::Receiver<JoinHandle<Trigger>>,
        store: Arc<dyn TriggerStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tasks,
            store,
            shutdown,
        }
    }

    /// Run until shutdown is signalled and every tracked poller has exited.
    pub async fn run(mut self) {
        tracing::info!("Reaper starting");
        let mut live: FuturesUnordered<JoinHandle<Trigger>> = FuturesUnordered::new();

        loop {
            while let Ok(handle) = self.tasks.try_recv() {
                live.push(handle);
            }

            if live.is_empty() {
                if self.shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(REAPER_WAIT) => {}
                    _ = self.shutdown.cancelled() => {}
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(REAPER_WAIT) => {}
                completed = live.next() => {
                    if let Some(result) = completed {
                        self.finalize(result).await;
                    }
                }
            }
        }

        tracing::info!("Reaper exiting");
    }

    async fn finalize(&self, result: std::result::Result<Trigger, JoinError>) {
        match result {
            Ok(trigger) => {
                tracing::info!(
                    trigger_id = %trigger.trigger_id,
                    state = %trigger.state,
                    "Poller completed"
                );
                if trigger.state == TriggerState::Deleting {
                    match self.store.delete(&trigger.trigger_id).await {
                        Ok(_) => {
                            tracing::info!(
                                trigger_id = %trigger.trigger_id,
                                "Removed deleted trigger from store"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                trigger_id = %trigger.trigger_id,
                                error = %e,
                                "Failed to remove deleted trigger from store"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Poller task panicked");
            }
        }
    }
}

//! Poller lifecycle supervisor
//!
//! Owns the shutdown signal, the reaper, and the channel that hands new
//! poller tasks to it. At startup it recovers every persisted ENABLED
//! trigger; at shutdown it lowers the flag and waits for the reaper to
//! drain.

use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::{Error, Result, ScanClause, ScanValue, Trigger, TriggerState};

use crate::poller::{Poller, PollerContext};
use crate::reaper::Reaper;

pub struct PollerSupervisor {
    ctx: PollerContext,
    task_sender: mpsc::Sender<JoinHandle<Trigger>>,
    task_receiver: Mutex<Option<mpsc::Receiver<JoinHandle<Trigger>>>>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollerSupervisor {
    pub fn new(ctx: PollerContext, reaper_queue_capacity: usize) -> Self {
        let (task_sender, task_receiver) = mpsc::channel(reaper_queue_capacity.max(1));
        Self {
            ctx,
            task_sender,
            task_receiver: Mutex::new(Some(task_receiver)),
            reaper_handle: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &PollerContext {
        &self.ctx
    }

    /// Spawn the reaper and recover persisted ENABLED triggers.
    pub async fn start(&self) -> Result<()> {
        let receiver = self
            .task_receiver
            .lock()
            .expect("supervisor lock poisoned")
            .take()
            .ok_or_else(|| Error::internal("Supervisor already started"))?;

        let reaper = Reaper::new(receiver, self.ctx.store.clone(), self.ctx.shutdown.clone());
        *self.reaper_handle.lock().expect("supervisor lock poisoned") =
            Some(tokio::spawn(reaper.run()));

        let mut clause = ScanClause::new();
        clause.insert(
            "state".to_string(),
            ScanValue::One(serde_json::json!(TriggerState::Enabled.to_string())),
        );
        let enabled = self.ctx.store.scan(&[clause]).await?;
        tracing::info!(count = enabled.len(), "Recovering enabled triggers");
        for trigger in enabled {
            self.ctx
                .registry
                .set(&trigger.trigger_id, TriggerState::Enabled)?;
            self.spawn_poller(trigger).await?;
        }
        Ok(())
    }

    /// Spawn a poller for a trigger and hand its task to the reaper.
    pub async fn spawn_poller(&self, trigger: Trigger) -> Result<()> {
        tracing::info!(trigger_id = %trigger.trigger_id, "Starting poller for trigger");
        let poller = Poller::new(self.ctx.clone(), trigger);
        let handle = tokio::spawn(poller.run());
        self.task_sender
            .send(handle)
            .await
            .map_err(|_| Error::internal("Reaper task channel closed"))?;
        Ok(())
    }

    /// Lower the active flag and wait for the reaper (and with it, every
    /// poller) to finish. Pollers observe the flag at their next loop check;
    /// in-flight ticks complete first.
    pub async fn shutdown(&self) {
        tracing::info!("Supervisor shutting down");
        self.ctx.shutdown.cancel();
        let handle = self
            .reaper_handle
            .lock()
            .expect("supervisor lock poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Reaper task failed");
            }
        }
    }
}

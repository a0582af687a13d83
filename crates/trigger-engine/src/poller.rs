//! Per-trigger poller
//!
//! One poller task owns each ENABLED trigger: it drains the trigger's
//! queue, evaluates the filter and template per message, dispatches the
//! action endpoint, and tracks every outstanding action until it reaches a
//! terminal status. The poll interval adapts between 1 s and 30 s based on
//! whether the previous tick did any work.
//!
//! All mutation of the trigger record is confined to the poller task;
//! per-tick fan-out runs as in-task concurrent futures whose results are
//! folded back in completion order.

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use auth::TokenRefresher;
use expressions::{eval_expression, eval_template};
use shared::{
    ActionStatus, ActionStatusValue, Event, Result, Trigger, TriggerState, TriggerStore,
};

use crate::actions::ActionClient;
use crate::metrics;
use crate::queue::QueueClient;
use crate::registry::TriggerStateRegistry;
use crate::tokens::bearer_for_scope;

/// Scope authorizing queue receive calls
pub const QUEUES_RECEIVE_SCOPE: &str =
    "https://auth.globus.org/scopes/3170bf0b-6789-4285-9aba-8b7875be7cbc/receive";

/// Action id used for failures that never reached the action endpoint
pub const LOCAL_FAILURE_ACTION_ID: &str = "trigger_action_failure";

const MIN_POLL_TIME: Duration = Duration::from_secs(1);
const MAX_POLL_TIME: Duration = Duration::from_secs(30);
const INITIAL_POLL_TIME: Duration = Duration::from_secs(5);
const MAX_MESSAGES_PER_RECEIVE: u32 = 10;

/// Collaborators shared by every poller in the process
#[derive(Clone)]
pub struct PollerContext {
    pub store: Arc<dyn TriggerStore>,
    pub queue: Arc<dyn QueueClient>,
    pub actions: Arc<dyn ActionClient>,
    pub refresher: Arc<dyn TokenRefresher>,
    pub registry: Arc<TriggerStateRegistry>,
    pub shutdown: CancellationToken,
    pub action_status_log_limit: usize,
}

/// Everything a per-message or per-action subtask needs to reach the
/// trigger's action endpoint.
struct ActionTarget {
    client: Arc<dyn ActionClient>,
    url: String,
    /// Bearer token, or the failure message from obtaining one
    auth: std::result::Result<String, String>,
    creator_id: String,
    trigger_id: String,
}

pub struct Poller {
    ctx: PollerContext,
    trigger: Trigger,
    poll_time: Duration,
    outstanding_action_ids: HashSet<String>,
}

impl Poller {
    pub fn new(ctx: PollerContext, trigger: Trigger) -> Self {
        Self {
            ctx,
            trigger,
            poll_time: INITIAL_POLL_TIME,
            outstanding_action_ids: HashSet::new(),
        }
    }

    /// Drive the trigger until it is disabled with no outstanding actions,
    /// deleted, or the supervisor shuts down. The final trigger record is
    /// returned to the reaper for bookkeeping.
    pub async fn run(mut self) -> Trigger {
        let trigger_id = self.trigger.trigger_id.clone();
        tracing::info!(trigger_id = %trigger_id, "Poller starting");

        let outcome = self.poll_loop().await;
        if let Err(e) = outcome {
            tracing::error!(
                trigger_id = %trigger_id,
                error = %e,
                "Poller failed; demoting trigger to PENDING"
            );
            if self
                .ctx
                .registry
                .set(&trigger_id, TriggerState::Pending)
                .is_err()
            {
                // already DELETING; the reaper will finish the removal
                tracing::debug!(trigger_id = %trigger_id, "Trigger is DELETING; leaving state");
            }
        }

        self.trigger.state = self.ctx.registry.get(&trigger_id);
        metrics::record_poller_exit(&self.trigger.state.to_string());
        if let Err(e) = self.ctx.store.put(&self.trigger).await {
            tracing::error!(
                trigger_id = %trigger_id,
                error = %e,
                "Failed to persist trigger at poller exit"
            );
        }
        tracing::info!(trigger_id = %trigger_id, state = %self.trigger.state, "Poller exiting");
        self.trigger
    }

    async fn poll_loop(&mut self) -> Result<()> {
        loop {
            let state = self.ctx.registry.get(&self.trigger.trigger_id);
            // keep going while enabled, or while actions are still being
            // monitored and the trigger is not being deleted
            let keep_running = !self.ctx.shutdown.is_cancelled()
                && (state == TriggerState::Enabled
                    || (state != TriggerState::Deleting
                        && !self.outstanding_action_ids.is_empty()));
            if !keep_running {
                return Ok(());
            }

            self.poll_time = self.poll_time.clamp(MIN_POLL_TIME, MAX_POLL_TIME);
            tokio::select! {
                _ = tokio::time::sleep(self.poll_time) => {}
                _ = self.ctx.shutdown.cancelled() => continue,
            }

            self.tick().await?;
        }
    }

    /// One tick: receive and fan out messages, poll outstanding actions,
    /// join all subtasks, persist, and adapt the poll interval.
    async fn tick(&mut self) -> Result<()> {
        let trigger_id = self.trigger.trigger_id.clone();
        let state = self.ctx.registry.get(&trigger_id);
        let mut subtasks: FuturesUnordered<BoxFuture<'static, Option<ActionStatus>>> =
            FuturesUnordered::new();

        if state == TriggerState::Enabled {
            // bind intermediate results so no scrutinee borrows self across
            // the arms below
            let queue_auth = bearer_for_scope(
                &mut self.trigger,
                QUEUES_RECEIVE_SCOPE,
                self.ctx.refresher.as_ref(),
            )
            .await;
            match queue_auth {
                Ok(queue_bearer) => {
                    let queue_id = self.trigger.spec.queue_id;
                    let received = self
                        .ctx
                        .queue
                        .receive(queue_id, MAX_MESSAGES_PER_RECEIVE, &queue_bearer)
                        .await;
                    match received {
                        Ok(messages) => {
                            if !messages.is_empty() {
                                let action_auth = self.action_auth().await;
                                for msg in &messages {
                                    let event = Event::from_queue_message(msg);
                                    self.trigger.event_count += 1;
                                    metrics::record_event_received(&trigger_id);
                                    let names = event_names(&event, self.trigger.event_count);
                                    self.trigger.last_event = Some(event);

                                    subtasks.push(Box::pin(process_event(
                                        self.action_target(action_auth.clone()),
                                        self.trigger.spec.event_filter.clone(),
                                        self.trigger.spec.event_template.clone(),
                                        names,
                                        msg.message_id.clone(),
                                    )));

                                    // the queue is consumed, not a replay log:
                                    // delete regardless of filter outcome or
                                    // dispatch result
                                    if let Err(e) = self
                                        .ctx
                                        .queue
                                        .delete(queue_id, &msg.receipt_handle, &queue_bearer)
                                        .await
                                    {
                                        tracing::warn!(
                                            trigger_id = %trigger_id,
                                            message_id = %msg.message_id,
                                            error = %e,
                                            "Failed to delete message from queue"
                                        );
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            self.record_tick_failure(format!("Queue receive failed: {}", e))
                                .await?;
                        }
                    }
                }
                Err(e) => {
                    self.record_tick_failure(format!(
                        "No usable token for queue receive: {}",
                        e
                    ))
                    .await?;
                }
            }
        }

        if !self.outstanding_action_ids.is_empty() {
            let action_auth = self.action_auth().await;
            for action_id in self.outstanding_action_ids.iter().cloned() {
                metrics::record_action_poll(&trigger_id);
                subtasks.push(Box::pin(poll_action(
                    self.action_target(action_auth.clone()),
                    action_id,
                )));
            }
        }

        let ran_subtasks = !subtasks.is_empty();
        let mut statuses = Vec::new();
        while let Some(result) = subtasks.next().await {
            if let Some(status) = result {
                self.trigger
                    .record_action_status(status.clone(), self.ctx.action_status_log_limit);
                statuses.push(status);
            }
        }

        if ran_subtasks {
            self.outstanding_action_ids = statuses
                .iter()
                .filter(|s| !s.is_terminal())
                .map(|s| s.action_id.clone())
                .collect();
            self.ctx.store.put(&self.trigger).await?;
            self.poll_time /= 2;
        } else {
            self.poll_time = self.poll_time.saturating_mul(2);
        }
        Ok(())
    }

    /// Bearer token for the trigger's action scope; carried as a result so
    /// auth problems fail each dispatch instead of killing the poller.
    async fn action_auth(&mut self) -> std::result::Result<String, String> {
        let scope = self.trigger.spec.action_scope.clone().unwrap_or_default();
        bearer_for_scope(&mut self.trigger, &scope, self.ctx.refresher.as_ref())
            .await
            .map_err(|e| e.to_string())
    }

    fn action_target(&self, auth: std::result::Result<String, String>) -> ActionTarget {
        ActionTarget {
            client: self.ctx.actions.clone(),
            url: self.trigger.spec.action_url.clone(),
            auth,
            creator_id: self.trigger.created_by.clone(),
            trigger_id: self.trigger.trigger_id.clone(),
        }
    }

    /// Absorb a whole-tick failure (identity or queue) into the trigger's
    /// status log and persist it.
    async fn record_tick_failure(&mut self, details: String) -> Result<()> {
        tracing::warn!(trigger_id = %self.trigger.trigger_id, "{}", details);
        let status = failure_status(LOCAL_FAILURE_ACTION_ID, &self.trigger.created_by, details);
        self.trigger
            .record_action_status(status, self.ctx.action_status_log_limit);
        self.ctx.store.put(&self.trigger).await
    }
}

/// Names visible to filter and template expressions: the event's fields
/// plus the running `event_count`.
fn event_names(event: &Event, event_count: u64) -> Map<String, Value> {
    let mut names = match serde_json::to_value(event) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    names.insert("event_count".to_string(), json!(event_count));
    names
}

fn failure_status(action_id: &str, creator_id: &str, details: impl Into<String>) -> ActionStatus {
    ActionStatus {
        status: ActionStatusValue::Failed,
        action_id: action_id.to_string(),
        creator_id: creator_id.to_string(),
        start_time: Utc::now(),
        label: None,
        monitor_by: None,
        manage_by: None,
        completion_time: None,
        release_after: None,
        display_status: None,
        details: Some(Value::String(details.into())),
    }
}

/// Release a terminal status exactly once; a failed release is logged and
/// the pre-release status kept.
async fn finalize_status(
    client: &dyn ActionClient,
    action_url: &str,
    bearer: &str,
    status: ActionStatus,
) -> ActionStatus {
    if !status.is_terminal() {
        return status;
    }
    match client.release(action_url, &status.action_id, bearer).await {
        Ok(released) => released,
        Err(e) => {
            tracing::warn!(
                action_id = %status.action_id,
                error = %e,
                "Failed to release completed action"
            );
            status
        }
    }
}

/// Filter, template, and dispatch for one received message.
///
/// Expression and HTTP failures come back as synthetic FAILED statuses;
/// a filter that does not evaluate to exactly `true` dispatches nothing.
async fn process_event(
    target: ActionTarget,
    event_filter: String,
    event_template: Value,
    names: Map<String, Value>,
    request_id: String,
) -> Option<ActionStatus> {
    let filter_value = match eval_expression(&event_filter, &names) {
        Ok(value) => value,
        Err(e) => {
            let msg = format!(
                "Unable to evaluate filter ({}) on event: {}",
                event_filter, e
            );
            tracing::info!(trigger_id = %target.trigger_id, "{}", msg);
            return Some(failure_status(
                LOCAL_FAILURE_ACTION_ID,
                &target.creator_id,
                msg,
            ));
        }
    };

    if filter_value != Value::Bool(true) {
        tracing::debug!(
            trigger_id = %target.trigger_id,
            filter = %event_filter,
            "Filter rejected event"
        );
        return None;
    }

    let body = match eval_template(&event_template, &names) {
        Ok(body) => body,
        Err(e) => {
            let msg = format!("Unable to evaluate action template: {}", e);
            tracing::info!(trigger_id = %target.trigger_id, "{}", msg);
            return Some(failure_status(
                LOCAL_FAILURE_ACTION_ID,
                &target.creator_id,
                msg,
            ));
        }
    };

    let bearer = match &target.auth {
        Ok(bearer) => bearer.clone(),
        Err(msg) => {
            return Some(failure_status(
                LOCAL_FAILURE_ACTION_ID,
                &target.creator_id,
                msg.clone(),
            ));
        }
    };

    metrics::record_action_dispatched(&target.trigger_id);
    match target
        .client
        .run(&target.url, &request_id, &body, &bearer)
        .await
    {
        Ok(status) => {
            Some(finalize_status(target.client.as_ref(), &target.url, &bearer, status).await)
        }
        Err(e) => Some(failure_status(
            LOCAL_FAILURE_ACTION_ID,
            &target.creator_id,
            format!("Action run failed: {}", e),
        )),
    }
}

/// Status-poll one outstanding action; terminal results are released.
async fn poll_action(target: ActionTarget, action_id: String) -> Option<ActionStatus> {
    let bearer = match &target.auth {
        Ok(bearer) => bearer.clone(),
        Err(msg) => {
            return Some(failure_status(&action_id, &target.creator_id, msg.clone()));
        }
    };

    match target.client.status(&target.url, &action_id, &bearer).await {
        Ok(status) => {
            Some(finalize_status(target.client.as_ref(), &target.url, &bearer, status).await)
        }
        Err(e) => Some(failure_status(
            &action_id,
            &target.creator_id,
            format!("Action status poll failed: {}", e),
        )),
    }
}

//! Metrics for the poller engine

/// Record a message received from a queue
pub fn record_event_received(trigger_id: &str) {
    metrics::counter!("trigger_engine.events_received", "trigger_id" => trigger_id.to_string())
        .increment(1);
}

/// Record an action dispatched to an action endpoint
pub fn record_action_dispatched(trigger_id: &str) {
    metrics::counter!("trigger_engine.actions_dispatched", "trigger_id" => trigger_id.to_string())
        .increment(1);
}

/// Record a status poll of an outstanding action
pub fn record_action_poll(trigger_id: &str) {
    metrics::counter!("trigger_engine.action_polls", "trigger_id" => trigger_id.to_string())
        .increment(1);
}

/// Record a poller exiting, labeled by the trigger's final state
pub fn record_poller_exit(state: &str) {
    metrics::counter!("trigger_engine.poller_exits", "state" => state.to_string()).increment(1);
}

//! Trigger state registry
//!
//! The authoritative in-process lifecycle state for every trigger. It is
//! the only structure shared between HTTP handlers and pollers, so all
//! transitions go through it and DELETING is enforced as terminal here.

use dashmap::DashMap;
use shared::{Error, Result, TriggerState};

#[derive(Default)]
pub struct TriggerStateRegistry {
    states: DashMap<String, TriggerState>,
}

impl TriggerStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a trigger; a trigger never seen is PENDING.
    pub fn get(&self, trigger_id: &str) -> TriggerState {
        self.states
            .get(trigger_id)
            .map(|entry| *entry)
            .unwrap_or(TriggerState::Pending)
    }

    /// Transition a trigger, returning the previous state.
    ///
    /// A trigger already in DELETING rejects every further transition.
    pub fn set(&self, trigger_id: &str, state: TriggerState) -> Result<TriggerState> {
        let mut entry = self
            .states
            .entry(trigger_id.to_string())
            .or_insert(TriggerState::Pending);
        let previous = *entry;
        if previous == TriggerState::Deleting {
            return Err(Error::conflict(format!(
                "Cannot change state of trigger {} in state DELETING",
                trigger_id
            )));
        }
        *entry = state;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_trigger_is_pending() {
        let registry = TriggerStateRegistry::new();
        assert_eq!(registry.get("nope"), TriggerState::Pending);
    }

    #[test]
    fn test_set_returns_previous_state() {
        let registry = TriggerStateRegistry::new();
        let prev = registry.set("t-1", TriggerState::Enabled).unwrap();
        assert_eq!(prev, TriggerState::Pending);
        let prev = registry.set("t-1", TriggerState::Pending).unwrap();
        assert_eq!(prev, TriggerState::Enabled);
    }

    #[test]
    fn test_deleting_is_terminal() {
        let registry = TriggerStateRegistry::new();
        registry.set("t-1", TriggerState::Enabled).unwrap();
        registry.set("t-1", TriggerState::Deleting).unwrap();

        let err = registry.set("t-1", TriggerState::Pending).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(registry.get("t-1"), TriggerState::Deleting);
    }

    #[tokio::test]
    async fn test_concurrent_transitions_to_deleting_conflict() {
        use std::sync::Arc;

        let registry = Arc::new(TriggerStateRegistry::new());
        registry.set("t-1", TriggerState::Enabled).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.set("t-1", TriggerState::Deleting).is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        // exactly one transition into DELETING wins
        assert_eq!(successes, 1);
    }
}

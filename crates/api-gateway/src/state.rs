//! Shared application state for the HTTP surface

use auth::IdentityClient;
use shared::TriggerStore;
use std::sync::Arc;
use trigger_engine::{PollerSupervisor, TriggerStateRegistry};

pub struct AppState {
    pub store: Arc<dyn TriggerStore>,
    pub identity: Arc<IdentityClient>,
    pub registry: Arc<TriggerStateRegistry>,
    pub supervisor: Arc<PollerSupervisor>,
    /// Shared outbound HTTP pool (action-scope discovery)
    pub http: reqwest::Client,
}

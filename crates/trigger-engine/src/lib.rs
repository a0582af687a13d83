//! Concurrent trigger runtime
//!
//! The core of the trigger service: a per-trigger poller engine with an
//! in-process state registry, a reaper that finalizes deletions, and the
//! supervisor that ties their lifecycles together. Queue and action
//! endpoints are reached through trait-based clients so everything here is
//! testable without the network.

pub mod actions;
pub mod metrics;
pub mod poller;
pub mod queue;
pub mod registry;
pub mod reaper;
pub mod supervisor;
pub mod tokens;

pub use actions::{ActionClient, HttpActionClient};
pub use poller::{Poller, PollerContext, LOCAL_FAILURE_ACTION_ID, QUEUES_RECEIVE_SCOPE};
pub use queue::{HttpQueueClient, QueueClient};
pub use registry::TriggerStateRegistry;
pub use reaper::Reaper;
pub use supervisor::PollerSupervisor;

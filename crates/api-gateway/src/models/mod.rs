//! Data Transfer Objects (DTOs) for API requests and responses

pub mod common;
pub mod triggers;

pub use common::*;
pub use triggers::*;

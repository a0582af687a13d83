//! Identity integration for the trigger service
//!
//! This crate provides:
//! - [`IdentityClient`]: token introspection, dependent-token exchange,
//!   refresh grants, and scope lookup/creation with caching
//! - [`AuthInfo`]: a per-request session with memoized token accessors
//! - [`TokenRefresher`]: the refresh seam consumed by the poller engine

pub mod client;
pub mod session;
pub mod transport;

pub use client::{IdentityClient, TokenRefresher};
pub use session::AuthInfo;
pub use transport::{AuthBody, AuthRequest, AuthTransport, HttpMethod, ReqwestAuthTransport};

//! Security Module
//!
//! Caller identity extraction and response hardening for the API.
//! Authentication itself happens upstream; this service trusts the injected owner headers.

pub mod identity;
pub mod middleware;

pub use identity::OwnerIdentity;
pub use middleware::security_headers_middleware;

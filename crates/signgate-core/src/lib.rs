//! Core types and configuration for SignGate.
//!
//! This crate holds the pieces shared by every SignGate crate: the
//! process-wide [`SignGateConfig`] loaded once at startup, the
//! [`AppId`] newtype for registered application identifiers, and the
//! startup-time error type.

mod config;
mod error;
mod types;

pub use config::{DEFAULT_EXEMPT_PATHS, SignGateConfig};
pub use error::{SignGateError, SignGateResult};
pub use types::AppId;

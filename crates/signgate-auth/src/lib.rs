//! Request parameter signatures for SignGate.
//!
//! This crate implements the verification side of the gateway's parameter
//! signing scheme: given the flat parameter map of a request and the secret of
//! the caller's registered application, it recomputes the expected signature
//! and compares it to the one the caller supplied.
//!
//! # Overview
//!
//! A client signs a request by:
//!
//! 1. Collecting every request parameter except `sign`, dropping blank values.
//! 2. Sorting the remaining names lexicographically and joining them as
//!    `name=value` pairs separated by `&`.
//! 3. Appending `&appSecret=<secret>`.
//! 4. Hashing the result with the algorithm named by `signType`
//!    (`SHA256` when absent) and sending the lowercase hex digest as `sign`.
//!
//! Secrets are looked up through an [`ApplicationRegistry`]; the
//! [`CredentialResolver`] wraps a registry with the single bounded attempt the
//! gateway is allowed per request.
//!
//! # Usage
//!
//! ```rust
//! use signgate_auth::canonical::ParameterMap;
//! use signgate_auth::signature::{compute_signature, verify_signature};
//!
//! let mut params = ParameterMap::new();
//! params.insert("appId".to_owned(), "app-1".to_owned());
//! params.insert("nonce".to_owned(), "n-42".to_owned());
//! params.insert("timestamp".to_owned(), "1700000000000".to_owned());
//!
//! let sign = compute_signature(&params, "s3cr3t").unwrap();
//! assert!(verify_signature(&params, &sign, "s3cr3t"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical string construction
//! - [`credentials`] - Application credentials and the registry trait
//! - [`error`] - Signature and credential error types
//! - [`registry`] - HTTP client for the remote application registry
//! - [`resolver`] - Timeout-bounded credential resolution
//! - [`signature`] - Parameter validation, digest computation and comparison

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod signature;

pub use canonical::{ParameterMap, build_canonical_string};
pub use credentials::{ApplicationCredential, ApplicationRegistry, StaticApplicationRegistry};
pub use error::{CredentialError, SignatureError};
pub use registry::HttpApplicationRegistry;
pub use resolver::CredentialResolver;
pub use signature::{
    SignType, SignatureArtifact, check_timestamp, compute_signature, validate_params,
    verify_params, verify_signature,
};

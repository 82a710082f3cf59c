//! HTTP signature verification stage for SignGate.
//!
//! This crate plugs the parameter-signature check of `signgate-auth` into a
//! hyper request pipeline, providing:
//!
//! - **Exemptions**: ANT-style path patterns that bypass verification
//! - **Extraction**: Flattening JSON, form and query parameters into one map
//! - **Replayable body**: Buffering the body once so the next stage can still read it
//! - **Filter**: The per-request decision between forwarding and denying
//! - **Service**: A hyper `Service` wrapper that runs the filter before an inner service
//! - **Response helpers**: Structured JSON denial responses

pub mod body;
pub mod error;
pub mod exempt;
pub mod extract;
pub mod filter;
pub mod identity;
pub mod response;
pub mod service;

pub use body::{ForwardBody, ReplayableBody};
pub use error::ExtractionError;
pub use exempt::{AntPattern, PathMatcher};
pub use extract::extract_parameters;
pub use filter::{Denial, DenyReason, FilterSettings, Outcome, SignatureFilter};
pub use identity::CallerIdentity;
pub use response::{DenialHandler, JsonDenialHandler};
pub use service::SignatureService;

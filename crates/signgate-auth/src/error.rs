//! Error types for signature verification and credential resolution.

/// Errors raised while validating or checking a parameter signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A required signing parameter is missing or blank.
    #[error("Missing required signing parameter: {0}")]
    MissingParameter(&'static str),

    /// The `signType` parameter names an algorithm that is not supported.
    #[error("Unsupported sign type: {0}")]
    UnsupportedSignType(String),

    /// The `timestamp` parameter is not a Unix epoch in milliseconds.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The `timestamp` parameter is outside the accepted clock skew.
    #[error("Request timestamp is outside the accepted window")]
    Expired,

    /// The computed signature does not match the supplied one.
    #[error("Signature does not match")]
    Mismatch,
}

impl SignatureError {
    /// Whether the request was malformed, as opposed to signed with the wrong secret.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

/// Errors raised while resolving an application's credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The registry has no usable record for the application.
    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    /// The registry could not be reached or answered with a failure.
    #[error("Application registry unavailable: {0}")]
    RegistryUnavailable(String),
}

//! Error types for the SignGate core.

/// Startup and configuration errors.
///
/// These never occur while a request is being verified: anything that can
/// fail here is detected once, before the gateway starts accepting traffic.
#[derive(Debug, thiserror::Error)]
pub enum SignGateError {
    /// Invalid application identifier.
    #[error("invalid application id: {0:?}")]
    InvalidAppId(String),

    /// An exemption path pattern could not be compiled.
    #[error("invalid exemption pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for SignGate core operations.
pub type SignGateResult<T> = Result<T, SignGateError>;

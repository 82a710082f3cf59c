//! The per-request verification decision.
//!
//! [`SignatureFilter::evaluate`] walks a fixed sequence of checks and ends in
//! exactly one [`Outcome`]:
//!
//! 1. Anonymous or unauthenticated caller: forward.
//! 2. Signature checking disabled: forward.
//! 3. Exempt path: forward.
//! 4. Otherwise verify, and forward only if every step succeeds.
//!
//! Every failure while verifying becomes a [`Denial`]. Nothing in this module
//! returns an error to the caller.

use std::fmt;
use std::time::Duration;

use http::StatusCode;
use http::request::Parts;
use signgate_auth::canonical::APP_ID_KEY;
use signgate_auth::{
    CredentialError, CredentialResolver, SignatureError, check_timestamp, validate_params,
    verify_params,
};
use signgate_core::{SignGateConfig, SignGateResult};
use tracing::{debug, info, warn};

use crate::body::{BoxError, ReplayableBody};
use crate::error::ExtractionError;
use crate::exempt::PathMatcher;
use crate::extract::extract_parameters;
use crate::identity::CallerIdentity;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The caller has no usable application.
    InvalidClient,
    /// The supplied signature does not match.
    SignatureInvalid,
    /// The request parameters cannot be verified as sent.
    SignatureFormatError,
    /// The application registry could not be consulted.
    RegistryUnavailable,
}

impl DenyReason {
    /// The code written to the denial body.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidClient => "InvalidClient",
            Self::SignatureInvalid => "SignatureInvalid",
            Self::SignatureFormatError => "SignatureFormatError",
            Self::RegistryUnavailable => "RegistryUnavailable",
        }
    }

    /// The HTTP status of the denial response.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::SignatureFormatError => StatusCode::BAD_REQUEST,
            Self::RegistryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decided denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// The reason code.
    pub reason: DenyReason,
    /// Human-readable detail. Never contains secrets or digests.
    pub message: String,
}

impl Denial {
    /// Create a denial.
    pub fn new(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<ExtractionError> for Denial {
    fn from(err: ExtractionError) -> Self {
        Self::new(DenyReason::SignatureFormatError, err.to_string())
    }
}

impl From<SignatureError> for Denial {
    fn from(err: SignatureError) -> Self {
        let reason = if err.is_format_error() {
            DenyReason::SignatureFormatError
        } else {
            DenyReason::SignatureInvalid
        };
        Self::new(reason, err.to_string())
    }
}

impl From<CredentialError> for Denial {
    fn from(err: CredentialError) -> Self {
        let reason = match err {
            CredentialError::UnknownApplication(_) => DenyReason::InvalidClient,
            CredentialError::RegistryUnavailable(_) => DenyReason::RegistryUnavailable,
        };
        Self::new(reason, err.to_string())
    }
}

/// Terminal result of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the request on unchanged.
    Forward,
    /// Stop the request and answer with a denial.
    Deny(Denial),
}

impl Outcome {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Filter settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSettings {
    /// Administrative switch for signature checking.
    pub check_signature_enabled: bool,
    /// Exemption patterns in match order.
    pub exempt_path_patterns: Vec<String>,
    /// Accepted clock skew for `timestamp`. `None` disables the check.
    pub timestamp_tolerance: Option<Duration>,
    /// Maximum body size buffered for extraction.
    pub max_body_bytes: usize,
}

impl From<&SignGateConfig> for FilterSettings {
    fn from(config: &SignGateConfig) -> Self {
        Self {
            check_signature_enabled: config.check_signature_enabled,
            exempt_path_patterns: config.exempt_path_patterns.clone(),
            timestamp_tolerance: config.timestamp_tolerance,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::from(&SignGateConfig::default())
    }
}

/// Source of the current time in epoch milliseconds.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The signature verification stage.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct SignatureFilter {
    check_signature_enabled: bool,
    matcher: PathMatcher,
    resolver: CredentialResolver,
    timestamp_tolerance: Option<Duration>,
    max_body_bytes: usize,
    clock: Clock,
}

impl SignatureFilter {
    /// Build a filter from `settings`, resolving secrets through `resolver`.
    ///
    /// # Errors
    ///
    /// Returns [`SignGateError::InvalidPattern`](signgate_core::SignGateError::InvalidPattern)
    /// if an exemption pattern cannot be compiled.
    pub fn new(settings: FilterSettings, resolver: CredentialResolver) -> SignGateResult<Self> {
        let matcher = PathMatcher::new(&settings.exempt_path_patterns)?;
        info!(
            enabled = settings.check_signature_enabled,
            exempt_patterns = matcher.patterns().len(),
            registry_timeout = ?resolver.timeout(),
            timestamp_tolerance = ?settings.timestamp_tolerance,
            "Signature filter configured"
        );
        Ok(Self {
            check_signature_enabled: settings.check_signature_enabled,
            matcher,
            resolver,
            timestamp_tolerance: settings.timestamp_tolerance,
            max_body_bytes: settings.max_body_bytes,
            clock: system_clock,
        })
    }

    /// Replace the clock used for the timestamp check.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The compiled exemption patterns.
    #[must_use]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Decide whether the request described by `identity`, `parts` and `body`
    /// may proceed.
    ///
    /// The body is buffered only if its content carries signed parameters; in
    /// every case it remains readable in full through `body` afterwards.
    pub async fn evaluate<B>(
        &self,
        identity: &CallerIdentity,
        parts: &Parts,
        body: &mut ReplayableBody<B>,
    ) -> Outcome
    where
        B: http_body::Body,
        B::Error: Into<BoxError>,
    {
        let path = parts.uri.path();

        if !identity.is_authenticated() {
            debug!(path, "Anonymous caller, skipping signature check");
            return Outcome::Forward;
        }
        if !self.check_signature_enabled {
            debug!(path, "Signature checking disabled");
            return Outcome::Forward;
        }
        if let Some(pattern) = self.matcher.matching_pattern(path) {
            debug!(path, pattern = pattern.as_str(), "Path exempt from signature check");
            return Outcome::Forward;
        }

        match self.verify(identity, parts, body).await {
            Ok(()) => Outcome::Forward,
            Err(denial) => {
                warn!(
                    path,
                    method = %parts.method,
                    app_id = ?identity.application_id().map(signgate_core::AppId::as_str),
                    reason = %denial.reason,
                    message = %denial.message,
                    "Request denied by signature check"
                );
                Outcome::Deny(denial)
            }
        }
    }

    async fn verify<B>(
        &self,
        identity: &CallerIdentity,
        parts: &Parts,
        body: &mut ReplayableBody<B>,
    ) -> Result<(), Denial>
    where
        B: http_body::Body,
        B::Error: Into<BoxError>,
    {
        let app_id = identity.application_id().ok_or_else(|| {
            Denial::new(DenyReason::InvalidClient, "caller has no application id")
        })?;

        let mut params = extract_parameters(parts, body, self.max_body_bytes).await?;
        validate_params(&params)?;
        if let Some(tolerance) = self.timestamp_tolerance {
            check_timestamp(&params, (self.clock)(), tolerance)?;
        }

        let credential = self.resolver.resolve_application(app_id).await?;
        let secret = credential.secret().ok_or_else(|| {
            Denial::new(DenyReason::InvalidClient, "application has no secret")
        })?;

        params.insert(APP_ID_KEY.to_owned(), credential.app_id.clone());
        verify_params(&params, secret)?;

        debug!(app_id = %app_id, params = params.len(), "Signature verified");
        Ok(())
    }
}

//! Timeout-bounded credential resolution.
//!
//! The registry lookup is the only step of a verification that leaves the
//! process. [`CredentialResolver`] makes exactly one attempt per call, bounds it
//! with a timeout, and turns every kind of failure into a [`CredentialError`].
//! Dropping the returned future abandons the in-flight lookup.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use signgate_core::AppId;
use tracing::{debug, warn};

use crate::credentials::{ApplicationCredential, ApplicationRegistry};
use crate::error::CredentialError;

/// Resolves an application id to a credential that is safe to verify with.
#[derive(Clone)]
pub struct CredentialResolver {
    registry: Arc<dyn ApplicationRegistry>,
    timeout: Duration,
}

impl CredentialResolver {
    /// Create a resolver over `registry` whose lookups give up after `timeout`.
    pub fn new(registry: Arc<dyn ApplicationRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// The configured lookup bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `app_id` to a usable credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::UnknownApplication`] if the registry has no
    /// record, or the record has no secret, is disabled, or belongs to a
    /// different id. Returns [`CredentialError::RegistryUnavailable`] if the
    /// lookup failed or did not finish within the timeout.
    pub async fn resolve_application(
        &self,
        app_id: &AppId,
    ) -> Result<ApplicationCredential, CredentialError> {
        let lookup = self.registry.fetch_application(app_id);
        let record = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(app_id = %app_id, timeout = ?self.timeout, "Registry lookup timed out");
                return Err(CredentialError::RegistryUnavailable(format!(
                    "lookup timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        match record {
            Some(credential) if credential.is_usable_for(app_id) => {
                debug!(app_id = %app_id, "Resolved application credential");
                Ok(credential)
            }
            Some(credential) => {
                warn!(
                    app_id = %app_id,
                    registry_app_id = %credential.app_id,
                    enabled = credential.enabled,
                    has_secret = credential.secret().is_some(),
                    "Registry record is not usable for verification"
                );
                Err(CredentialError::UnknownApplication(app_id.to_string()))
            }
            None => {
                debug!(app_id = %app_id, "Application not found in registry");
                Err(CredentialError::UnknownApplication(app_id.to_string()))
            }
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("registry", &"...")
            .field("timeout", &self.timeout)
            .finish()
    }
}

//! Application credentials and the registry trait.
//!
//! This module defines the [`ApplicationRegistry`] trait for fetching the
//! signing secret of a registered application, along with a
//! [`StaticApplicationRegistry`] for testing and development use cases.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use signgate_core::AppId;

use crate::error::CredentialError;

/// The registry record of one application.
///
/// A credential is only usable for verification when its secret is present
/// and non-blank, it is enabled, and its id is a valid [`AppId`]; see
/// [`ApplicationCredential::is_usable_for`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApplicationCredential {
    /// The application id as reported by the registry.
    pub app_id: String,
    /// The shared signing secret.
    pub secret: Option<String>,
    /// Whether the application is allowed to call the gateway.
    pub enabled: bool,
}

impl ApplicationCredential {
    /// Create an enabled credential with a secret.
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: Some(secret.into()),
            enabled: true,
        }
    }

    /// The secret, if it is present and non-blank.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Whether this credential may be used to verify requests of `requested`.
    #[must_use]
    pub fn is_usable_for(&self, requested: &AppId) -> bool {
        self.enabled
            && self.secret().is_some()
            && AppId::new(self.app_id.as_str()).is_ok_and(|id| &id == requested)
    }
}

impl fmt::Debug for ApplicationCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationCredential")
            .field("app_id", &self.app_id)
            .field("secret", &self.secret.as_ref().map(|_| "..."))
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Trait for looking up application credentials by application id.
///
/// Implementations may back this with a remote service, a database, or any
/// other credential store. Caching, if any, belongs to the implementation.
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Fetch the record for `app_id`.
    ///
    /// Returns `Ok(None)` when the registry answered but has no such
    /// application.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::RegistryUnavailable`] when the registry
    /// cannot be consulted.
    async fn fetch_application(
        &self,
        app_id: &AppId,
    ) -> Result<Option<ApplicationCredential>, CredentialError>;
}

/// A simple in-memory registry backed by a `HashMap`.
///
/// Suitable for testing and development environments. For production use,
/// point the gateway at the remote registry with
/// [`HttpApplicationRegistry`](crate::registry::HttpApplicationRegistry).
///
/// # Examples
///
/// ```
/// use signgate_auth::credentials::StaticApplicationRegistry;
///
/// let registry = StaticApplicationRegistry::new(vec![
///     ("1552274783265".to_owned(), "0a1b2c3d4e5f".to_owned()),
/// ]);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticApplicationRegistry {
    applications: HashMap<String, ApplicationCredential>,
}

impl StaticApplicationRegistry {
    /// Create a registry from an iterable of (app_id, secret) pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            applications: credentials
                .into_iter()
                .map(|(id, secret)| (id.clone(), ApplicationCredential::new(id, secret)))
                .collect(),
        }
    }

    /// Create a registry from full credential records.
    pub fn from_credentials(credentials: impl IntoIterator<Item = ApplicationCredential>) -> Self {
        Self {
            applications: credentials
                .into_iter()
                .map(|c| (c.app_id.clone(), c))
                .collect(),
        }
    }

    /// Number of registered applications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applications.len()
    }

    /// Whether no application is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

#[async_trait]
impl ApplicationRegistry for StaticApplicationRegistry {
    async fn fetch_application(
        &self,
        app_id: &AppId,
    ) -> Result<Option<ApplicationCredential>, CredentialError> {
        Ok(self.applications.get(app_id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str) -> AppId {
        AppId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_should_return_credential_for_known_app() {
        let registry =
            StaticApplicationRegistry::new(vec![("app".to_owned(), "secret".to_owned())]);

        let credential = registry.fetch_application(&app("app")).await.unwrap();
        let credential = credential.unwrap();
        assert_eq!(credential.secret(), Some("secret"));
        assert!(credential.is_usable_for(&app("app")));
    }

    #[tokio::test]
    async fn test_should_return_none_for_unknown_app() {
        let registry = StaticApplicationRegistry::new(vec![]);

        let result = registry.fetch_application(&app("UNKNOWN")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_should_not_use_credential_without_secret() {
        let mut credential = ApplicationCredential::new("app", "secret");
        credential.secret = None;
        assert!(!credential.is_usable_for(&app("app")));

        credential.secret = Some("  ".to_owned());
        assert!(!credential.is_usable_for(&app("app")));
    }

    #[test]
    fn test_should_not_use_disabled_credential() {
        let mut credential = ApplicationCredential::new("app", "secret");
        credential.enabled = false;
        assert!(!credential.is_usable_for(&app("app")));
    }

    #[test]
    fn test_should_not_use_credential_of_other_or_invalid_app() {
        assert!(!ApplicationCredential::new("other", "secret").is_usable_for(&app("app")));
        assert!(!ApplicationCredential::new("", "secret").is_usable_for(&app("app")));
    }

    #[test]
    fn test_should_hide_secret_in_debug_output() {
        let credential = ApplicationCredential::new("app", "super-secret");
        assert!(!format!("{credential:?}").contains("super-secret"));
    }
}

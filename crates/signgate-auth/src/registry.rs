//! HTTP client for the remote application registry.
//!
//! The registry exposes one lookup:
//!
//! ```text
//! GET {base_url}/app/{appId}
//!
//! 200 OK
//! {
//!   "code": 0,
//!   "message": "success",
//!   "data": { "applicationId": "1552274783265", "secret": "0a1b2c3d4e5f", "enabled": true }
//! }
//! ```
//!
//! `data` is `null` (or absent) when the application does not exist. Any
//! transport failure, non-2xx status or undecodable body is reported as
//! [`CredentialError::RegistryUnavailable`].

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use signgate_core::{AppId, SignGateError, SignGateResult};
use tracing::{debug, warn};

use crate::credentials::{ApplicationCredential, ApplicationRegistry};
use crate::error::CredentialError;

/// Characters escaped when the app id is placed in the lookup path.
///
/// Only RFC 3986 unreserved characters are left as-is.
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Envelope wrapping every registry response.
#[derive(Debug, serde::Deserialize)]
struct ResultBody<T> {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// The `data` payload of an application lookup.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryApplication {
    #[serde(alias = "appId")]
    application_id: String,
    #[serde(default, alias = "appSecret")]
    secret: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<RegistryApplication> for ApplicationCredential {
    fn from(app: RegistryApplication) -> Self {
        Self {
            app_id: app.application_id,
            secret: app.secret,
            enabled: app.enabled,
        }
    }
}

/// [`ApplicationRegistry`] backed by the remote registry service.
#[derive(Debug, Clone)]
pub struct HttpApplicationRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApplicationRegistry {
    /// Create a registry client for `base_url` whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SignGateError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SignGateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SignGateError::Config(format!("cannot build registry client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a registry client reusing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    /// The lookup URL for `app_id`.
    #[must_use]
    pub fn application_url(&self, app_id: &AppId) -> String {
        format!(
            "{}/app/{}",
            self.base_url,
            utf8_percent_encode(app_id.as_str(), PATH_SEGMENT_ENCODE_SET)
        )
    }
}

#[async_trait]
impl ApplicationRegistry for HttpApplicationRegistry {
    async fn fetch_application(
        &self,
        app_id: &AppId,
    ) -> Result<Option<ApplicationCredential>, CredentialError> {
        let url = self.application_url(app_id);
        debug!(app_id = %app_id, url = %url, "Fetching application from registry");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(app_id = %app_id, error = %e, "Registry request failed");
            CredentialError::RegistryUnavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(app_id = %app_id, %status, "Registry answered with failure status");
            return Err(CredentialError::RegistryUnavailable(format!(
                "registry answered {status}"
            )));
        }

        let body: ResultBody<RegistryApplication> = response.json().await.map_err(|e| {
            warn!(app_id = %app_id, error = %e, "Registry response could not be decoded");
            CredentialError::RegistryUnavailable(format!("undecodable registry response: {e}"))
        })?;

        debug!(
            app_id = %app_id,
            code = ?body.code,
            message = ?body.message,
            found = body.data.is_some(),
            "Registry lookup completed"
        );

        Ok(body.data.map(ApplicationCredential::from))
    }
}

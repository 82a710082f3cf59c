//! Caller identity from a trusted request header.
//!
//! SignGate runs behind an authentication stage that has already decided who
//! the caller is and records the application id in a header. This adapter
//! turns that header into the [`CallerIdentity`] read by the signature stage.
//! Any inbound copy of the header must be stripped by the authentication
//! stage, otherwise callers can choose their own identity.

use http::HeaderMap;
use http::header::{HeaderName, InvalidHeaderName};
use signgate_core::AppId;
use signgate_http::CallerIdentity;
use tracing::debug;

/// Reads the caller identity from a fixed header.
#[derive(Debug, Clone)]
pub struct IdentityHeader {
    name: HeaderName,
}

impl IdentityHeader {
    /// Create an adapter for the header called `name`.
    pub fn new(name: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            name: HeaderName::from_bytes(name.trim().as_bytes())?,
        })
    }

    /// The identity described by `headers`.
    ///
    /// - header absent: anonymous
    /// - header holding a valid app id: authenticated as that application
    /// - header present but unusable: authenticated without an application
    pub fn identify(&self, headers: &HeaderMap) -> CallerIdentity {
        let Some(value) = headers.get(&self.name) else {
            return CallerIdentity::anonymous();
        };

        let app_id = value.to_str().ok().and_then(|v| AppId::new(v).ok());
        if app_id.is_none() {
            debug!(header = %self.name, "identity header does not hold a valid application id");
        }
        CallerIdentity::authenticated(app_id)
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(value: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = value {
            headers.insert("x-auth-app-id", HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_should_treat_missing_header_as_anonymous() {
        let adapter = IdentityHeader::new("x-auth-app-id").unwrap();
        assert!(!adapter.identify(&headers(None)).is_authenticated());
    }

    #[test]
    fn test_should_authenticate_valid_application_id() {
        let adapter = IdentityHeader::new("X-Auth-App-Id").unwrap();
        let identity = adapter.identify(&headers(Some("app-a")));
        assert!(identity.is_authenticated());
        assert_eq!(identity.application_id().map(AppId::as_str), Some("app-a"));
    }

    #[test]
    fn test_should_authenticate_without_application_for_blank_header() {
        let adapter = IdentityHeader::new("x-auth-app-id").unwrap();
        let identity = adapter.identify(&headers(Some("")));
        assert!(identity.is_authenticated());
        assert!(identity.application_id().is_none());
    }

    #[test]
    fn test_should_reject_invalid_header_name() {
        assert!(IdentityHeader::new("bad header").is_err());
    }
}

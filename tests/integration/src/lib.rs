//! Integration tests for SignGate server.
//!
//! These tests require a running server at `localhost:8888` started with
//! `STATIC_APPS=it-app:it-secret` and the default exemption patterns. They
//! are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! STATIC_APPS=it-app:it-secret cargo run -p signgate-server &
//! cargo test -p signgate-integration -- --ignored
//! ```

use std::sync::Once;

use signgate_auth::canonical::ParameterMap;
use signgate_auth::compute_signature;

static INIT: Once = Once::new();

/// Application id registered on the server under test.
pub const APP_ID: &str = "it-app";

/// Secret of [`APP_ID`].
pub const APP_SECRET: &str = "it-secret";

/// Header carrying the authenticated application id.
pub const IDENTITY_HEADER: &str = "x-auth-app-id";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
#[must_use]
pub fn endpoint_url() -> String {
    std::env::var("SIGNGATE_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:8888".to_owned())
}

/// Create an HTTP client for the server.
#[must_use]
pub fn client() -> reqwest::Client {
    init_tracing();
    reqwest::Client::new()
}

/// Build a parameter map with a fresh nonce and timestamp, signed with `secret`.
#[must_use]
pub fn signed_params(app_id: &str, secret: &str, extra: &[(&str, &str)]) -> ParameterMap {
    let mut params: ParameterMap = extra
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    params.insert("appId".to_owned(), app_id.to_owned());
    params.insert("nonce".to_owned(), uuid::Uuid::new_v4().to_string());
    params.insert(
        "timestamp".to_owned(),
        chrono::Utc::now().timestamp_millis().to_string(),
    );

    let sign = compute_signature(&params, secret)
        .unwrap_or_else(|e| panic!("failed to sign parameters: {e}"));
    params.insert("sign".to_owned(), sign);
    params
}

/// Whether `status` is one of the statuses the signature stage denies with.
#[must_use]
pub fn is_denial(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 400 | 401 | 503)
}

mod test_health;
mod test_signature;

//! Configuration management for SignGate.
//!
//! All configuration is driven by environment variables and read exactly once
//! at startup. The resulting [`SignGateConfig`] is immutable and is shared by
//! reference (usually behind an `Arc`) for the lifetime of the process.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Paths that never require a signature unless configured otherwise.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &["/**/login/**", "/**/logout/**"];

/// Global configuration for SignGate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignGateConfig {
    /// Bind address for the gateway.
    pub gateway_listen: String,
    /// Log level.
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    /// Administrative switch for signature checking.
    pub check_signature_enabled: bool,
    /// ANT-style path patterns exempt from signature checking, in match order.
    pub exempt_path_patterns: Vec<String>,
    /// Base URL of the application registry. `None` uses the in-memory registry.
    pub registry_url: Option<String>,
    /// Upper bound for one registry lookup.
    pub registry_timeout: Duration,
    /// Accepted clock skew for the signed `timestamp` parameter. `None` disables the check.
    pub timestamp_tolerance: Option<Duration>,
    /// Maximum request body size buffered for parameter extraction.
    pub max_body_bytes: usize,
    /// Upstream target that verified requests are forwarded to.
    pub upstream_url: String,
    /// Header carrying the application id established by the authentication stage.
    pub identity_header: String,
    /// In-memory application credentials as `(app_id, secret)` pairs.
    pub static_apps: Vec<(String, String)>,
}

impl Default for SignGateConfig {
    fn default() -> Self {
        Self {
            gateway_listen: "0.0.0.0:8888".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            check_signature_enabled: true,
            exempt_path_patterns: DEFAULT_EXEMPT_PATHS
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
            registry_url: None,
            registry_timeout: Duration::from_millis(3000),
            timestamp_tolerance: Some(Duration::from_secs(300)),
            max_body_bytes: 1024 * 1024,
            upstream_url: "http://127.0.0.1:8080".to_owned(),
            identity_header: "x-auth-app-id".to_owned(),
            static_apps: Vec::new(),
        }
    }
}

impl SignGateConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults. Values that fail to parse are logged
    /// and ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            config.log_json = v.trim().eq_ignore_ascii_case("json");
        }
        if let Some(v) = lookup("CHECK_SIGNATURE") {
            config.check_signature_enabled = parse_bool(&v);
        }
        if let Some(v) = lookup("SIGNATURE_EXEMPT_PATHS") {
            config.exempt_path_patterns = split_list(&v);
        }
        if let Some(v) = lookup("REGISTRY_URL") {
            let v = v.trim().trim_end_matches('/');
            config.registry_url = (!v.is_empty()).then(|| v.to_owned());
        }
        if let Some(ms) =
            lookup("REGISTRY_TIMEOUT_MS").and_then(|v| parse_number("REGISTRY_TIMEOUT_MS", &v))
        {
            config.registry_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("SIGNATURE_TIMESTAMP_TOLERANCE_SECS")
            .and_then(|v| parse_number("SIGNATURE_TIMESTAMP_TOLERANCE_SECS", &v))
        {
            config.timestamp_tolerance = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(bytes) =
            lookup("MAX_BODY_BYTES").and_then(|v| parse_number("MAX_BODY_BYTES", &v))
        {
            config.max_body_bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
        }
        if let Some(v) = lookup("UPSTREAM_URL") {
            config.upstream_url = v.trim_end_matches('/').to_owned();
        }
        if let Some(v) = lookup("IDENTITY_HEADER") {
            config.identity_header = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = lookup("STATIC_APPS") {
            config.static_apps = parse_static_apps(&v);
        }

        config
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value, "ignoring non-numeric configuration value");
            None
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse `id:secret,id:secret`. Entries without a colon are skipped.
fn parse_static_apps(value: &str) -> Vec<(String, String)> {
    split_list(value)
        .into_iter()
        .filter_map(|entry| match entry.split_once(':') {
            Some((id, secret)) if !id.trim().is_empty() => {
                Some((id.trim().to_owned(), secret.to_owned()))
            }
            _ => {
                warn!("ignoring malformed STATIC_APPS entry");
                None
            }
        })
        .collect()
}

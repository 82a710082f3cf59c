//! Denial responses.

use bytes::Bytes;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http_body_util::Full;

use crate::filter::Denial;

/// Content type of denial bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Header carrying the per-request id on denial responses.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Writes the response for a denied request.
///
/// The handler runs instead of the downstream service; the request is not
/// forwarded once it is called.
pub trait DenialHandler: Send + Sync {
    /// Build the response for `denial` of the request described by `parts`.
    fn handle(
        &self,
        parts: &Parts,
        denial: &Denial,
        request_id: &str,
    ) -> http::Response<Full<Bytes>>;
}

/// Default handler writing a JSON body with the reason code.
///
/// ```json
/// {
///   "status": 401,
///   "code": "SignatureInvalid",
///   "message": "Signature does not match"
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDenialHandler;

impl DenialHandler for JsonDenialHandler {
    fn handle(
        &self,
        _parts: &Parts,
        denial: &Denial,
        request_id: &str,
    ) -> http::Response<Full<Bytes>> {
        denial_to_response(denial, request_id)
    }
}

/// Serialize a denial into its JSON body.
#[must_use]
pub fn denial_to_json(denial: &Denial) -> Vec<u8> {
    let status = denial.reason.status_code();
    serde_json::json!({
        "status": status.as_u16(),
        "code": denial.reason.as_str(),
        "message": denial.message,
    })
    .to_string()
    .into_bytes()
}

/// Convert a denial into a complete HTTP response.
#[must_use]
pub fn denial_to_response(denial: &Denial, request_id: &str) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from(denial_to_json(denial))));
    *response.status_mut() = denial.reason.status_code();

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }

    response
}

//! Forwarding verified requests to the upstream service.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{self, HeaderName};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use signgate_http::ForwardBody;
use tracing::{debug, warn};

/// Bound on establishing a connection to the upstream.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Headers that describe a single connection and are not forwarded.
static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Hyper `Service` proxying requests to one upstream base URL.
///
/// Upstream failures are answered with `502 Bad Gateway`; the service itself
/// never fails.
#[derive(Debug, Clone)]
pub struct UpstreamService {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamService {
    /// Create a forwarder to `base_url`.
    pub fn new(base_url: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// The upstream URL for a request path and query.
    fn target_url(&self, uri: &http::Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str);
        format!("{}{path_and_query}", self.base_url)
    }
}

impl<B> hyper::service::Service<http::Request<ForwardBody<B>>> for UpstreamService
where
    ForwardBody<B>: Body<Data = Bytes> + Send + 'static,
    <ForwardBody<B> as Body>::Error: std::fmt::Display,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<ForwardBody<B>>) -> Self::Future {
        let client = self.client.clone();
        let url = self.target_url(req.uri());

        Box::pin(async move {
            match forward(&client, &url, req).await {
                Ok(response) => Ok(response),
                Err(message) => {
                    warn!(url = %url, error = %message, "upstream request failed");
                    Ok(bad_gateway(&message))
                }
            }
        })
    }
}

async fn forward<B>(
    client: &reqwest::Client,
    url: &str,
    req: http::Request<B>,
) -> Result<http::Response<Full<Bytes>>, String>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| format!("failed to read request body: {e}"))?
        .to_bytes();

    debug!(method = %parts.method, url, bytes = body.len(), "forwarding request upstream");

    let upstream = client
        .request(parts.method, url)
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let body = upstream.bytes().await.map_err(|e| e.to_string())?;

    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy of `headers` without hop-by-hop headers.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in &HOP_BY_HOP {
        out.remove(name);
    }
    out
}

fn bad_gateway(message: &str) -> http::Response<Full<Bytes>> {
    let body = serde_json::json!({
        "status": 502,
        "code": "BadGateway",
        "message": message,
    })
    .to_string();

    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = http::StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

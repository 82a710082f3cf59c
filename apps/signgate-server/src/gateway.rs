//! Gateway service in front of the signature stage.
//!
//! Health checks (`GET /health`, `GET /_health`) are answered directly. Every
//! other request gets its [`CallerIdentity`](signgate_http::CallerIdentity)
//! attached from the identity header and then runs through the
//! [`SignatureService`], which forwards to the upstream or denies.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{Either, Full};
use hyper::body::Incoming;
use hyper::service::Service;
use signgate_http::SignatureService;

use crate::identity::IdentityHeader;
use crate::upstream::UpstreamService;

/// Body of a request that went through the signature stage.
pub type SignedBody = Either<Full<Bytes>, Full<Bytes>>;

/// Unified response body of the gateway.
pub type GatewayBody = Either<Full<Bytes>, SignedBody>;

/// Top-level hyper service of the server.
#[derive(Debug, Clone)]
pub struct GatewayService {
    identity: IdentityHeader,
    signature: SignatureService<UpstreamService>,
}

impl GatewayService {
    /// Create a gateway reading identities with `identity` and verifying
    /// requests with `signature`.
    pub fn new(identity: IdentityHeader, signature: SignatureService<UpstreamService>) -> Self {
        Self {
            identity,
            signature,
        }
    }
}

impl Service<http::Request<Incoming>> for GatewayService {
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, mut req: http::Request<Incoming>) -> Self::Future {
        // Intercept health checks at the gateway level.
        if is_health_check(req.method(), req.uri().path()) {
            return Box::pin(async { Ok(health_check_response().map(Either::Left)) });
        }

        let identity = self.identity.identify(req.headers());
        req.extensions_mut().insert(identity);

        let signature = self.signature.clone();
        Box::pin(async move {
            let resp = signature.call(req).await;
            Ok(resp.unwrap_or_else(|e| match e {}).map(Either::Right))
        })
    }
}

/// Check if the request is a health check.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/health" || path == "/_health")
}

/// Produce the health check response.
fn health_check_response() -> http::Response<Full<Bytes>> {
    let body = serde_json::json!({
        "status": "running",
        "version": crate::VERSION,
    })
    .to_string();

    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

//! Hyper `Service` wrapper that runs the signature stage before an inner service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{Either, Full};
use tracing::debug;

use crate::body::{BoxError, ForwardBody, ReplayableBody};
use crate::filter::{Outcome, SignatureFilter};
use crate::identity::CallerIdentity;
use crate::response::{DenialHandler, JsonDenialHandler};

/// Hyper `Service` enforcing parameter signatures.
///
/// The caller identity is read from the request extensions, where the
/// authentication stage placed a [`CallerIdentity`]; a request without one is
/// anonymous. Forwarded requests reach `inner` with the complete original
/// body. Denied requests never reach `inner`.
pub struct SignatureService<S> {
    inner: S,
    filter: Arc<SignatureFilter>,
    denial_handler: Arc<dyn DenialHandler>,
}

impl<S> SignatureService<S> {
    /// Wrap `inner` with `filter`, answering denials with [`JsonDenialHandler`].
    pub fn new(inner: S, filter: Arc<SignatureFilter>) -> Self {
        Self {
            inner,
            filter,
            denial_handler: Arc::new(JsonDenialHandler),
        }
    }

    /// Replace the handler writing denial responses.
    #[must_use]
    pub fn with_denial_handler(mut self, handler: Arc<dyn DenialHandler>) -> Self {
        self.denial_handler = handler;
        self
    }
}

impl<S: Clone> Clone for SignatureService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            filter: Arc::clone(&self.filter),
            denial_handler: Arc::clone(&self.denial_handler),
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for SignatureService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService")
            .field("inner", &self.inner)
            .field("filter", &self.filter)
            .field("denial_handler", &"...")
            .finish()
    }
}

impl<S, B, ResBody> hyper::service::Service<http::Request<B>> for SignatureService<S>
where
    S: hyper::service::Service<
            http::Request<ForwardBody<B>>,
            Response = http::Response<ResBody>,
        > + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError>,
    ResBody: Send + 'static,
{
    type Response = http::Response<Either<ResBody, Full<Bytes>>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        let filter = Arc::clone(&self.filter);
        let denial_handler = Arc::clone(&self.denial_handler);

        Box::pin(async move {
            let identity = req
                .extensions()
                .get::<CallerIdentity>()
                .cloned()
                .unwrap_or_default();
            let (parts, body) = req.into_parts();
            let mut body = ReplayableBody::new(body);

            match filter.evaluate(&identity, &parts, &mut body).await {
                Outcome::Forward => {
                    let req = http::Request::from_parts(parts, body.into_forward_body());
                    let response = inner.call(req).await?;
                    Ok(response.map(Either::Left))
                }
                Outcome::Deny(denial) => {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    debug!(
                        request_id = %request_id,
                        reason = %denial.reason,
                        "Writing denial response"
                    );
                    let response = denial_handler.handle(&parts, &denial, &request_id);
                    Ok(response.map(Either::Right))
                }
            }
        })
    }
}

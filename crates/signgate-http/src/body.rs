//! Request body buffering and the body handed to the next stage.
//!
//! Reading parameters out of a form or JSON body consumes the underlying
//! stream. [`ReplayableBody`] buffers it once, exposes the bytes to any number
//! of readers, and converts into a [`ForwardBody`] that still carries the full
//! original payload.

use std::error::Error as StdError;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};

use crate::error::ExtractionError;

/// Boxed error type used by [`ForwardBody`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A request body that is either still streaming or fully buffered.
#[derive(Debug)]
pub enum ReplayableBody<B> {
    /// The body has not been read.
    Streaming(B),
    /// The body has been read into memory and can be replayed.
    Buffered(Bytes),
    /// Reading the body failed part-way; its content is lost.
    Consumed,
}

impl<B> ReplayableBody<B> {
    /// Wrap an unread body.
    pub fn new(body: B) -> Self {
        Self::Streaming(body)
    }

    /// Whether the body has been buffered.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// A fresh handle on the buffered bytes, if the body has been buffered.
    #[must_use]
    pub fn replay(&self) -> Option<Bytes> {
        match self {
            Self::Buffered(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Convert into the body forwarded to the next stage.
    ///
    /// A buffered body is replayed in full; an unread body is passed through
    /// untouched.
    pub fn into_forward_body(self) -> ForwardBody<B> {
        match self {
            Self::Streaming(body) => ForwardBody::Streaming(body),
            Self::Buffered(bytes) => ForwardBody::Buffered(Full::new(bytes)),
            Self::Consumed => ForwardBody::Empty,
        }
    }
}

impl<B> ReplayableBody<B>
where
    B: http_body::Body,
    B::Error: Into<BoxError>,
{
    /// Read the whole body into memory, at most `limit` bytes.
    ///
    /// Calling this again after a successful read returns the same bytes
    /// without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::BodyTooLarge`] if the body exceeds `limit`,
    /// or [`ExtractionError::Body`] if it could not be read. Either way the
    /// body is left [`ReplayableBody::Consumed`].
    pub async fn buffer(&mut self, limit: usize) -> Result<&Bytes, ExtractionError> {
        if let Self::Streaming(_) = self {
            let Self::Streaming(body) = std::mem::replace(self, Self::Consumed) else {
                return Err(ExtractionError::Body(
                    "body state changed while buffering".to_owned(),
                ));
            };
            let collected = Limited::new(body, limit)
                .collect()
                .await
                .map_err(|e| read_error(&e, limit))?;
            *self = Self::Buffered(collected.to_bytes());
        }

        match self {
            Self::Buffered(bytes) => Ok(bytes),
            _ => Err(ExtractionError::Body("request body was already consumed".to_owned())),
        }
    }
}

fn read_error(err: &BoxError, limit: usize) -> ExtractionError {
    if err.downcast_ref::<LengthLimitError>().is_some() {
        ExtractionError::BodyTooLarge { limit }
    } else {
        ExtractionError::Body(err.to_string())
    }
}

/// The body forwarded to the next stage after the signature check.
#[derive(Debug)]
pub enum ForwardBody<B> {
    /// The original, unread stream.
    Streaming(B),
    /// A replay of the buffered bytes.
    Buffered(Full<Bytes>),
    /// No content.
    Empty,
}

impl<B> http_body::Body for ForwardBody<B>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Streaming(body) => Pin::new(body).poll_frame(cx).map_err(Into::into),
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Streaming(body) => body.is_end_stream(),
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Streaming(body) => body.size_hint(),
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

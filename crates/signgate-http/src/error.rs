//! Parameter extraction errors.

/// Errors raised while turning a request into a parameter map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// The `Content-Type` header is not a valid media type.
    #[error("Invalid Content-Type header: {0}")]
    InvalidContentType(String),

    /// The request body could not be read.
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// The request body exceeds the buffering limit.
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// The configured limit.
        limit: usize,
    },

    /// The body or a percent-decoded query or form pair is not valid UTF-8.
    #[error("Request parameters are not valid UTF-8")]
    InvalidUtf8,

    /// The JSON body could not be parsed.
    #[error("Malformed JSON body: {0}")]
    InvalidJson(String),

    /// The JSON body is valid JSON but not an object.
    #[error("JSON body must be an object")]
    NotAnObject,

    /// The same parameter name appears more than once.
    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),
}

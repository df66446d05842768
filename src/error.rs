use std::fmt;

/// A type-erased error, used anywhere a collaborator (store, transport) may fail
/// in a way the core cannot further categorize.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The supplied URL is not absolute and cannot be turned into a cache key.
#[derive(Debug)]
pub struct BadRequest(pub String);

impl fmt::Display for BadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad request: {}", self.0)
    }
}

impl std::error::Error for BadRequest {}

/// A stored header name or value could not be turned back into an `http` type.
#[derive(Debug)]
pub struct BadHeader(pub String);

impl fmt::Display for BadHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad stored header: {}", self.0)
    }
}

impl std::error::Error for BadHeader {}

/// A stored entry's HTTP version code did not match any version this build
/// recognizes (see `serialize::version_from_u16`), or the wire prefix carried
/// an unsupported version.
#[derive(Debug)]
pub struct BadVersion(pub String);

impl fmt::Display for BadVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized HTTP version: {}", self.0)
    }
}

impl std::error::Error for BadVersion {}

/// The error type produced by [`crate::body::BodyTap`]'s wrapped body. Distinct
/// from `BoxError` so bodies the tap wraps only need `Into<StreamingError>`,
/// not a specific concrete error type.
#[derive(Debug)]
pub struct StreamingError(BoxError);

impl StreamingError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        StreamingError(error.into())
    }
}

impl fmt::Display for StreamingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "streaming body error: {}", self.0)
    }
}

impl std::error::Error for StreamingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<BoxError> for StreamingError {
    fn from(error: BoxError) -> Self {
        StreamingError(error)
    }
}

impl From<std::convert::Infallible> for StreamingError {
    fn from(error: std::convert::Infallible) -> Self {
        match error {}
    }
}

/// Top-level error surfaced by the cache. Only a malformed request URL or a
/// transport failure are meant to propagate to a caller; store/decode/policy
/// failures are downgraded internally to a miss and never produce this type.
#[derive(Debug)]
pub enum HttpCacheError {
    /// The cache rejected a request before it ever reached the transport
    /// (e.g. a non-absolute URL).
    CacheError(String),
    /// The response body could not be read to completion.
    BodyError(BoxError),
    /// The underlying transport failed.
    HttpError(BoxError),
}

impl fmt::Display for HttpCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpCacheError::CacheError(msg) => write!(f, "cache error: {msg}"),
            HttpCacheError::BodyError(e) => write!(f, "body processing error: {e}"),
            HttpCacheError::HttpError(e) => write!(f, "http error: {e}"),
        }
    }
}

impl std::error::Error for HttpCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpCacheError::CacheError(_) => None,
            HttpCacheError::BodyError(e) => Some(e.as_ref()),
            HttpCacheError::HttpError(e) => Some(e.as_ref()),
        }
    }
}

impl From<BoxError> for HttpCacheError {
    fn from(error: BoxError) -> Self {
        HttpCacheError::HttpError(error)
    }
}

impl From<BadRequest> for HttpCacheError {
    fn from(error: BadRequest) -> Self {
        HttpCacheError::CacheError(error.to_string())
    }
}

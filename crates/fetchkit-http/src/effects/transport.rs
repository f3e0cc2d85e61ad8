use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};

use crate::data::{RequestOptions, TransferStats};

/// A fully resolved request handed down the middleware stack.
///
/// `url` already carries the base URL and query; `options` is the merged
/// option bag, including the body.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: url::Url,
    pub options: RequestOptions,
}

impl TransportRequest {
    pub fn new(method: Method, url: url::Url, options: RequestOptions) -> Self { Self { method, url, options } }

    /// The host the request is addressed to, empty for host-less URLs.
    pub fn host(&self) -> &str { self.url.host_str().unwrap_or_default() }

    pub fn header(&self, name: &str) -> Option<String> { self.options.headers.get_line(name) }
}

/// A buffered response as produced by a transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,

    /// Filled by the innermost stage when the transport completed a transfer.
    pub stats: Option<TransferStats>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
            stats: None,
        }
    }

    /// Append a header; invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: TransferStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Why a transport could not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    /// The request could not be assembled from its options.
    #[error("invalid request: {0}")]
    Build(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether the failure happened before any response was received.
    pub fn is_connection(&self) -> bool { matches!(self, TransportError::Connect(_) | TransportError::Timeout) }
}

/// Sends one request and buffers the whole response.
///
/// Implementations never treat HTTP error statuses as failures; only
/// connection-level problems and unbuildable requests are errors.
///
/// # Implementations
///
/// - [`ReqwestTransport`](crate::ReqwestTransport): blocking `reqwest`
/// - any `Fn(TransportRequest) -> Result<RawResponse, TransportError>`
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(TransportRequest) -> Result<RawResponse, TransportError> + Send + Sync,
{
    fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> { self(request) }
}

use std::net::SocketAddr;
use std::time::Duration;

/// What the transport observed while completing a request.
///
/// Only responses that went through a transport carry stats; a response
/// synthesized by middleware without calling the next stage has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// Final URL after redirects.
    pub effective_uri: url::Url,

    /// Wall-clock time from dispatch to a fully buffered body.
    pub total_time: Duration,

    pub remote_addr: Option<SocketAddr>,

    /// Negotiated protocol, e.g. `HTTP/1.1`.
    pub http_version: Option<String>,
}

impl TransferStats {
    pub fn new(effective_uri: url::Url, total_time: Duration) -> Self {
        Self {
            effective_uri,
            total_time,
            remote_addr: None,
            http_version: None,
        }
    }
}

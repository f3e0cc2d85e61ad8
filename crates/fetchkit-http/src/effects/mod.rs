//! Everything that performs I/O: the transport, the middleware stack, the
//! request builder, the response wrapper, the remote helpers and the TLS
//! certificate capture.

mod client;
pub mod middleware;
pub mod remote;
mod response;
mod tls;
mod transport;

#[cfg(feature = "reqwest")]
mod reqwest_transport;

pub use client::HttpClient;
pub use middleware::{HandlerStack, Middleware, Next};
pub use remote::{ConnectionInfo, PageInfo, Remote};
pub use response::{HttpResponse, RequestError};
pub use transport::{RawResponse, Transport, TransportError, TransportRequest};

#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;

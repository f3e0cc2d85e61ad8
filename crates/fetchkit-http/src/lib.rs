//! Blocking HTTP request builder with a middleware stack and a decoding
//! response wrapper.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Option bags, transfer stats and client defaults
//! - [`core`] - Pure transformations (status classes, form/XML/HTML codecs,
//!   digest auth, URL parsing, X.509 decoding)
//! - `effects` - I/O: transport, middleware, [`HttpClient`], [`HttpResponse`]
//!   and the [`remote`] helpers
//!
//! # Example
//!
//! ```no_run
//! use fetchkit_http::HttpClient;
//!
//! let mut client = HttpClient::new();
//! let response = client.get("https://example.com/api", [("page", "2")])?;
//! if response.ok() {
//!     println!("{}", response.json_or("name", "unknown"));
//! }
//! # Ok::<(), fetchkit_http::Error>(())
//! ```

pub mod core;
pub mod data;
mod effects;
mod error;

pub use crate::core::{CertError, SslCertificate, Url};
pub use data::{
    Auth, Body, BodyFormat, ClientDefaults, Cookie, CookieJar, HeaderBag, IpVersion, Part, RequestOptions,
    TransferStats,
};
pub use effects::{
    ConnectionInfo, HandlerStack, HttpClient, HttpResponse, Middleware, Next, PageInfo, RawResponse, Remote,
    RequestError, Transport, TransportError, TransportRequest, middleware, remote,
};
pub use error::{Error, Result};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestTransport;

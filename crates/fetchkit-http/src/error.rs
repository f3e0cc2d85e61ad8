//! Error types for fetchkit-http.

use thiserror::Error;

use crate::core::cert::CertError;
use crate::core::xml::XmlError;
use crate::effects::{RequestError, TransportError};

#[derive(Debug, Error)]
pub enum Error {
    /// DNS, TCP, TLS or timeout failure before a response was received.
    #[error("connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: TransportError,
    },

    /// A response with a 4xx/5xx status was escalated.
    #[error(transparent)]
    Request(Box<RequestError>),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Logic(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("certificate error: {0}")]
    Certificate(#[from] CertError),

    #[error(transparent)]
    Fs(#[from] fetchkit_fs::Error),

    /// The request could not be assembled (bad header, bad proxy, no transport).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self { Error::Request(Box::new(e)) }
}

pub type Result<T> = std::result::Result<T, Error>;

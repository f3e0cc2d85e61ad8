//! Pure transformations: status classification, body encodings, XML and
//! HTML extraction, digest computation, URL parsing and certificate decoding.

pub mod cert;
pub mod digest;
pub mod form;
pub mod html;
pub mod status;
pub mod summary;
pub mod url;
pub mod xml;

pub use cert::{CertError, SslCertificate};
pub use form::form_pairs;
pub use html::{HeadTags, head_tags};
pub use status::{is_client_error, is_failed, is_ok, is_redirect, is_server_error, is_successful};
pub use summary::body_summary;
pub use self::url::Url;
pub use xml::XmlError;

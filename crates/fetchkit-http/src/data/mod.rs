//! Plain data types: request options, transfer stats and client defaults.
//!
//! Nothing in this module performs I/O; the values are built up by the
//! client and handed to the transport.

pub mod defaults;
pub mod options;
pub mod stats;

pub use defaults::ClientDefaults;
pub use options::{Auth, Body, BodyFormat, Cookie, CookieJar, HeaderBag, IpVersion, Part, RequestOptions};
pub use stats::TransferStats;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const KNOWN_SCHEMES: &[&str] = &["http://", "https://", "ssl://"];

/// A parsed absolute URL with a host.
///
/// Strings without an `http://`, `https://` or `ssl://` prefix are read as
/// `https://…`, so `example.com/path` parses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    inner: url::Url,
}

impl Url {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let has_scheme = KNOWN_SCHEMES.iter().any(|scheme| {
            trimmed
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        let candidate = if has_scheme {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let inner = url::Url::parse(&candidate)
            .map_err(|_| Error::InvalidUrl(format!("String `{input}` is not a valid url.")))?;
        if inner.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidUrl(format!("Could not determine host from url `{input}`")));
        }
        Ok(Self { inner })
    }

    pub fn scheme(&self) -> &str { self.inner.scheme() }

    pub fn host(&self) -> &str { self.inner.host_str().unwrap_or_default() }

    /// The explicit port, else 80 for `http`, else 443.
    pub fn port(&self) -> u16 {
        match self.inner.port() {
            Some(port) => port,
            None if self.scheme() == "http" => 80,
            None => 443,
        }
    }

    pub fn user(&self) -> Option<&str> { Some(self.inner.username()).filter(|u| !u.is_empty()) }

    pub fn password(&self) -> Option<&str> { self.inner.password() }

    pub fn path(&self) -> &str { self.inner.path() }

    pub fn query(&self) -> Option<&str> { self.inner.query() }

    pub fn fragment(&self) -> Option<&str> { self.inner.fragment() }

    pub fn as_str(&self) -> &str { self.inner.as_str() }

    pub fn as_url(&self) -> &url::Url { &self.inner }

    pub fn into_inner(self) -> url::Url { self.inner }
}

impl FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> { Url::parse(s) }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.inner.as_str()) }
}

impl From<Url> for url::Url {
    fn from(url: Url) -> Self { url.inner }
}

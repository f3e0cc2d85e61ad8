use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header names that carry a single value: setting them again replaces the
/// previous value instead of appending.
const SINGLE_VALUED: &[&str] = &["content-type", "accept", "authorization", "user-agent"];

fn is_single_valued(name: &str) -> bool {
    SINGLE_VALUED.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Ordered, case-insensitive header multimap.
///
/// Repeated names accumulate values, except for the single-valued
/// headers (`Content-Type`, `Accept`, `Authorization`, `User-Agent`)
/// which are overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderBag {
    pub fn new() -> Self { Self::default() }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Add a value under `name`, respecting the single-valued rule.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) if is_single_valued(&name) => self.entries[i].1 = vec![value],
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replace every value stored under `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// All values of `name` joined with `", "`.
    pub fn get_line(&self, name: &str) -> Option<String> { self.get(name).map(|v| v.join(", ")) }

    pub fn contains(&self, name: &str) -> bool { self.position(name).is_some() }

    /// Merge another bag into this one: list-valued headers concatenate,
    /// single-valued headers take the other bag's value.
    pub fn merge(&mut self, other: &HeaderBag) {
        for (name, values) in &other.entries {
            match self.position(name) {
                Some(i) if is_single_valued(name) => self.entries[i].1 = values.clone(),
                Some(i) => self.entries[i].1.extend(values.iter().cloned()),
                None => self.entries.push((name.clone(), values.clone())),
            }
        }
    }

    /// Iterate `(name, value)` pairs, one per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.entries.iter().map(|(k, _)| k.as_str()) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = HeaderBag::new();
        for (k, v) in iter {
            bag.append(k, v);
        }
        bag
    }
}

/// Which address family the transport may connect over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Any,
    V4,
    V6,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { username: String, password: String },
    Digest { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, username) = match self {
            Auth::Basic { username, .. } => ("Basic", username),
            Auth::Digest { username, .. } => ("Digest", username),
        };
        f.debug_struct(kind)
            .field("username", username)
            .field("password", &"***")
            .finish()
    }
}

/// The encoding used for the data passed to body-bearing verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    #[default]
    Form,
    Json,
    Multipart,
    Raw,
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub contents: Bytes,
    pub filename: Option<String>,
    pub headers: HeaderBag,
}

impl Part {
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
            filename: None,
            headers: HeaderBag::new(),
        }
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Raw { content: Bytes, content_type: String },
    Multipart(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    /// `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expires.is_some_and(|at| at <= now) }
}

/// A flat cookie store keyed by `(domain, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>, domain: &str) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut jar = CookieJar::new();
        for (name, value) in pairs {
            jar.insert(Cookie {
                name: name.into(),
                value: value.into(),
                domain: domain.to_string(),
                expires: None,
            });
        }
        jar
    }

    pub fn insert(&mut self, cookie: Cookie) {
        match self
            .cookies
            .iter_mut()
            .find(|c| c.name == cookie.name && c.domain.eq_ignore_ascii_case(&cookie.domain))
        {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> { self.cookies.iter().find(|c| c.name == name) }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> { self.cookies.iter() }

    pub fn len(&self) -> usize { self.cookies.len() }

    pub fn is_empty(&self) -> bool { self.cookies.is_empty() }

    pub fn merge(&mut self, other: &CookieJar) {
        for cookie in &other.cookies {
            self.insert(cookie.clone());
        }
    }

    /// Drop the cookie `name` set for `domain`.
    pub fn remove(&mut self, name: &str, domain: &str) -> Option<Cookie> {
        let i = self
            .cookies
            .iter()
            .position(|c| c.name == name && c.domain.eq_ignore_ascii_case(domain))?;
        Some(self.cookies.remove(i))
    }

    /// The `Cookie` header value for a request to `host`, if any unexpired
    /// cookie matches it (exact host or a parent domain).
    pub fn header_for(&self, host: &str) -> Option<String> {
        let now = Utc::now();
        let line = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && domain_matches(host, &c.domain))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        (!line.is_empty()).then_some(line)
    }

    /// Record a `Set-Cookie` header received from `host`.
    ///
    /// A cookie whose `Max-Age` is zero or negative, or whose `Expires` lies
    /// in the past, removes the stored cookie of the same name instead.
    pub fn store_set_cookie(&mut self, header: &str, host: &str) {
        self.store_set_cookie_at(header, host, Utc::now());
    }

    fn store_set_cookie_at(&mut self, header: &str, host: &str, now: DateTime<Utc>) {
        let mut attrs = header.split(';').map(str::trim);
        let Some((name, value)) = attrs.next().and_then(|kv| kv.split_once('=')) else {
            return;
        };

        let mut domain = host.to_string();
        let mut max_age = None;
        let mut expires = None;
        for (key, val) in attrs.filter_map(|a| a.split_once('=')) {
            let val = val.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => domain = val.trim_start_matches('.').to_string(),
                "max-age" => max_age = val.parse::<i64>().ok(),
                "expires" => expires = parse_cookie_date(val),
                _ => {}
            }
        }
        // Max-Age wins over Expires.
        let expires = match max_age {
            Some(secs) => Some(now + chrono::Duration::seconds(secs.max(0))),
            None => expires,
        };

        let cookie = Cookie {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
            domain,
            expires,
        };
        if cookie.is_expired(now) {
            if self.remove(&cookie.name, &cookie.domain).is_none() {
                self.cookies
                    .retain(|c| !(c.name == cookie.name && domain_matches(&cookie.domain, &c.domain)));
            }
        } else {
            self.insert(cookie);
        }
    }
}

/// `Expires` in RFC 1123 form, also accepting the dashed Netscape variant
/// (`Wed, 21-Oct-2015 07:28:00 GMT`).
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(&raw.replace('-', " "))
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host.eq_ignore_ascii_case(domain)
        || (host.len() > domain.len()
            && host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase())))
}

/// Accumulated request configuration.
///
/// Options are layered with [`RequestOptions::merge`]: headers and query
/// pairs accumulate, cookies merge by name, every other option is
/// overwritten when the newer layer sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub base_url: Option<String>,
    pub headers: HeaderBag,
    pub query: Vec<(String, String)>,
    pub auth: Option<Auth>,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub verify: Option<bool>,
    pub allow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
    pub ip_version: Option<IpVersion>,
    pub proxy: Option<String>,
    pub cookies: Option<CookieJar>,
    pub http_errors: Option<bool>,
}

macro_rules! overwrite {
    ($self:ident, $other:ident, $($field:ident),+) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field.clone();
            }
        )+
    };
}

impl RequestOptions {
    pub fn new() -> Self { Self::default() }

    pub fn merge(&mut self, other: &RequestOptions) {
        self.headers.merge(&other.headers);
        self.query.extend(other.query.iter().cloned());
        match (&mut self.cookies, &other.cookies) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.cookies = Some(theirs.clone()),
            _ => {}
        }
        overwrite!(
            self,
            other,
            base_url,
            auth,
            body,
            timeout,
            connect_timeout,
            verify,
            allow_redirects,
            max_redirects,
            ip_version,
            proxy,
            http_errors
        );
    }

    #[must_use]
    pub fn merged(mut self, other: &RequestOptions) -> Self {
        self.merge(other);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_append_accumulates() {
        let mut bag = HeaderBag::new();
        bag.append("X-Trace", "a");
        bag.append("x-trace", "b");
        assert_eq!(bag.get("X-TRACE").unwrap(), ["a", "b"]);
        assert_eq!(bag.get_line("x-trace").unwrap(), "a, b");
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_single_valued_headers_overwrite() {
        let mut bag = HeaderBag::new();
        bag.append("Content-Type", "application/json");
        bag.append("content-type", "application/x-www-form-urlencoded");
        assert_eq!(bag.get("Content-Type").unwrap(), ["application/x-www-form-urlencoded"]);
    }

    #[test]
    fn test_merge_headers() {
        let mut base: HeaderBag = [("X-A", "1"), ("Accept", "text/html")].into_iter().collect();
        let other: HeaderBag = [("X-A", "2"), ("Accept", "application/json")].into_iter().collect();
        base.merge(&other);
        assert_eq!(base.get("x-a").unwrap(), ["1", "2"]);
        assert_eq!(base.get("accept").unwrap(), ["application/json"]);
    }

    #[test]
    fn test_options_merge_scalars_overwrite() {
        let defaults = RequestOptions {
            timeout: Some(Duration::from_secs(30)),
            verify: Some(true),
            http_errors: Some(false),
            ..Default::default()
        };
        let call = RequestOptions {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let merged = defaults.merged(&call);
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
        assert_eq!(merged.verify, Some(true));
        assert_eq!(merged.http_errors, Some(false));
    }

    #[test]
    fn test_options_merge_query_appends() {
        let a = RequestOptions::new().query("a", "1");
        let b = RequestOptions::new().query("b", "2");
        let expected = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        assert_eq!(a.merged(&b).query, expected);
    }

    #[test]
    fn test_cookie_header_for_parent_domain() {
        let jar = CookieJar::from_pairs([("sid", "abc"), ("lang", "en")], "example.test");
        assert_eq!(jar.header_for("api.example.test").unwrap(), "sid=abc; lang=en");
        assert_eq!(jar.header_for("example.test").unwrap(), "sid=abc; lang=en");
        assert!(jar.header_for("other.test").is_none());
        assert!(jar.header_for("badexample.test").is_none());
    }

    #[test]
    fn test_store_set_cookie() {
        let mut jar = CookieJar::new();
        jar.store_set_cookie("sid=xyz; Path=/; Domain=.example.test; HttpOnly", "www.example.test");
        jar.store_set_cookie("theme=dark", "www.example.test");
        assert_eq!(jar.get("sid").unwrap().domain, "example.test");
        assert_eq!(jar.get("theme").unwrap().domain, "www.example.test");

        jar.store_set_cookie("sid=new; Domain=example.test", "www.example.test");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("sid").unwrap().value, "new");
    }

    #[test]
    fn test_expired_set_cookie_removes_stored_cookie() {
        let mut jar = CookieJar::new();
        jar.store_set_cookie("sid=abc", "www.example.test");
        jar.store_set_cookie("keep=1", "www.example.test");
        jar.store_set_cookie("sid=; Max-Age=0", "www.example.test");
        assert!(jar.get("sid").is_none());
        assert_eq!(jar.header_for("www.example.test").unwrap(), "keep=1");

        jar.store_set_cookie("keep=; Expires=Thu, 01 Jan 1970 00:00:00 GMT", "www.example.test");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_expired_set_cookie_clears_parent_domain_cookie() {
        let mut jar = CookieJar::from_pairs([("sid", "abc")], "example.test");
        jar.store_set_cookie("sid=deleted; Max-Age=-1", "www.example.test");
        assert!(jar.header_for("www.example.test").is_none());
    }

    #[test]
    fn test_set_cookie_lifetime() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let mut jar = CookieJar::new();
        jar.store_set_cookie_at("a=1; Max-Age=60; Expires=Thu, 01 Jan 1970 00:00:00 GMT", "h.test", now);
        jar.store_set_cookie_at("b=2; Expires=Wed, 01-May-2024 13:00:00 GMT", "h.test", now);
        assert_eq!(jar.get("a").unwrap().expires, Some(now + chrono::Duration::seconds(60)));
        assert_eq!(jar.get("b").unwrap().expires, Some(now + chrono::Duration::hours(1)));
        assert!(jar.get("a").unwrap().is_expired(now + chrono::Duration::seconds(61)));

        jar.store_set_cookie_at("b=; Expires=Wed, 01 May 2024 11:00:00 GMT", "h.test", now);
        assert!(jar.get("b").is_none());
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = Auth::Basic {
            username: "u".into(),
            password: "secret".into(),
        };
        assert!(!format!("{auth:?}").contains("secret"));
    }
}

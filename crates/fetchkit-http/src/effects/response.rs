use std::borrow::Cow;
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use once_cell::sync::OnceCell;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::transport::RawResponse;
use crate::core::{status, summary, xml};
use crate::data::{CookieJar, TransferStats};
use crate::error::{Error, Result};

const SAVED_NAME_LEN: usize = 40;

static NULL: Value = Value::Null;

struct Inner {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    stats: Option<TransferStats>,
    cookies: Option<CookieJar>,
    json: OnceCell<Value>,
    xml: OnceCell<Value>,
}

/// A received response.
///
/// Cheap to clone: clones share the body and the decode caches. JSON and
/// XML decodes are computed at most once each, on first use.
#[derive(Clone)]
pub struct HttpResponse {
    inner: Arc<Inner>,
}

impl HttpResponse {
    pub fn new(raw: RawResponse, cookies: Option<CookieJar>) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: raw.status,
                version: raw.version,
                headers: raw.headers,
                body: raw.body,
                stats: raw.stats,
                cookies,
                json: OnceCell::new(),
                xml: OnceCell::new(),
            }),
        }
    }

    /// Whether both handles point at the same response.
    pub fn ptr_eq(&self, other: &HttpResponse) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.inner.body) }

    pub fn bytes(&self) -> &Bytes { &self.inner.body }

    /// The body decoded as JSON.
    ///
    /// A successful decode is cached; a failed one is retried on the next
    /// call.
    pub fn json(&self) -> Result<&Value> {
        self.inner
            .json
            .get_or_try_init(|| serde_json::from_slice(&self.inner.body).map_err(Error::from))
    }

    /// `json()[key]`, or `None` when the key is absent or the body is not
    /// JSON. Numeric keys index into top-level arrays.
    pub fn json_get(&self, key: &str) -> Option<&Value> { self.json().ok().and_then(|v| lookup(v, key)) }

    pub fn json_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.json_get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// The body decoded as XML into a JSON value (see [`crate::core::xml`]).
    pub fn xml(&self) -> Result<&Value> {
        self.inner
            .xml
            .get_or_try_init(|| xml::decode(&self.body()).map_err(Error::from))
    }

    pub fn xml_get(&self, key: &str) -> Option<&Value> { self.xml().ok().and_then(|v| lookup(v, key)) }

    pub fn xml_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.xml_get(key).cloned().unwrap_or_else(|| default.into())
    }

    /// Deserialize the JSON body into `T`.
    pub fn object<T: DeserializeOwned>(&self) -> Result<T> { Ok(serde_json::from_slice(&self.inner.body)?) }

    pub fn status(&self) -> StatusCode { self.inner.status }

    pub fn status_code(&self) -> u16 { self.inner.status.as_u16() }

    pub fn reason(&self) -> &'static str { self.inner.status.canonical_reason().unwrap_or_default() }

    pub fn version(&self) -> Version { self.inner.version }

    /// Every value of `name` joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .inner
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }

    pub fn ok(&self) -> bool { status::is_ok(self.status_code()) }

    pub fn successful(&self) -> bool { status::is_successful(self.status_code()) }

    pub fn redirect(&self) -> bool { status::is_redirect(self.status_code()) }

    pub fn client_error(&self) -> bool { status::is_client_error(self.status_code()) }

    pub fn server_error(&self) -> bool { status::is_server_error(self.status_code()) }

    pub fn failed(&self) -> bool { status::is_failed(self.status_code()) }

    /// Fail with [`Error::Request`] when the status is 4xx/5xx.
    pub fn throw(&self) -> Result<&Self> { self.throw_with(|_, _| {}) }

    /// Like [`throw`](Self::throw), calling `notify` with the response and the
    /// error first. The callback observes the failure; it cannot cancel it.
    pub fn throw_with(&self, notify: impl FnOnce(&HttpResponse, &RequestError)) -> Result<&Self> {
        if !self.failed() {
            return Ok(self);
        }
        let error = RequestError::new(self.clone());
        notify(self, &error);
        Err(error.into())
    }

    /// Call `callback` when the status is 4xx/5xx.
    pub fn on_error(&self, callback: impl FnOnce(&HttpResponse)) -> &Self {
        if self.failed() {
            callback(self);
        }
        self
    }

    /// Write the body into `dir` under a random name with an extension
    /// sniffed from the content. Returns the written path.
    pub fn save_as(&self, dir: impl AsRef<Path>, mode: u32, lock: bool) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fetchkit_fs::ready_directory(dir, mode)?;

        let name: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SAVED_NAME_LEN)
            .map(char::from)
            .collect();
        let path = dir.join(format!("{name}.{}", fetchkit_fs::stream_extension(&self.inner.body)));

        let written = fetchkit_fs::put(&path, &self.inner.body, lock)?;
        tracing::debug!(path = %path.display(), bytes = written, "saved response body");
        Ok(path)
    }

    /// Responses are read-only; this always fails with [`Error::Logic`].
    pub fn insert(&self, _key: &str, _value: Value) -> Result<()> { Err(Error::Logic("HttpResponse is immutable")) }

    /// Responses are read-only; this always fails with [`Error::Logic`].
    pub fn remove(&self, _key: &str) -> Result<()> { Err(Error::Logic("HttpResponse is immutable")) }

    /// Final URL after redirects, when the response came from a transfer.
    pub fn effective_uri(&self) -> Option<&url::Url> { self.inner.stats.as_ref().map(|s| &s.effective_uri) }

    pub fn transfer_stats(&self) -> Option<&TransferStats> { self.inner.stats.as_ref() }

    /// The cookie jar the request was sent with, plus cookies the response set.
    pub fn cookies(&self) -> Option<&CookieJar> { self.inner.cookies.as_ref() }
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let found = match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    found.filter(|v| !v.is_null())
}

impl Index<&str> for HttpResponse {
    type Output = Value;

    /// `Value::Null` when the key is absent or the body is not JSON.
    fn index(&self, key: &str) -> &Value { self.json_get(key).unwrap_or(&NULL) }
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.body()) }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.inner.status)
            .field("headers", &self.inner.headers.len())
            .field("body", &self.inner.body.len())
            .finish_non_exhaustive()
    }
}

/// A 4xx/5xx response escalated by [`HttpResponse::throw`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    response: HttpResponse,
    message: String,
}

impl RequestError {
    pub fn new(response: HttpResponse) -> Self {
        let mut message = format!("HTTP request returned status code {}", response.status_code());
        if let Some(summary) = summary::body_summary(response.bytes()) {
            message.push_str(&format!(":\n{summary}\n"));
        }
        Self { response, message }
    }

    pub fn response(&self) -> &HttpResponse { &self.response }

    pub fn message(&self) -> &str { &self.message }

    pub fn status_code(&self) -> u16 { self.response.status_code() }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(RawResponse::new(StatusCode::from_u16(status).unwrap(), body.to_string()), None)
    }

    #[test]
    fn test_json_is_memoized() {
        let resp = response(200, r#"{"a":1,"list":[1,2]}"#);
        let first = resp.json().unwrap() as *const Value;
        let second = resp.json().unwrap() as *const Value;
        assert_eq!(first, second);
        assert_eq!(resp.json_get("a"), Some(&json!(1)));
        assert_eq!(resp.json_or("missing", 42), json!(42));
        assert_eq!(resp["list"], json!([1, 2]));
        assert_eq!(resp["missing"], Value::Null);
    }

    #[test]
    fn test_json_and_xml_slots_independent() {
        let resp = response(200, "<r><a>1</a></r>");
        assert!(resp.json().is_err());
        assert_eq!(resp.xml_get("a"), Some(&json!("1")));

        let resp = response(200, r#"{"a":2}"#);
        assert_eq!(resp.json_get("a"), Some(&json!(2)));
        assert!(resp.xml().is_err());
        assert_eq!(resp.json_get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_clones_share_cache() {
        let resp = response(200, r#"{"a":1}"#);
        let clone = resp.clone();
        let a = resp.json().unwrap() as *const Value;
        let b = clone.json().unwrap() as *const Value;
        assert_eq!(a, b);
        assert!(resp.ptr_eq(&clone));
    }

    #[test]
    fn test_object_decode() {
        #[derive(Deserialize)]
        struct Out {
            a: u32,
        }
        let out: Out = response(200, r#"{"a":7}"#).object().unwrap();
        assert_eq!(out.a, 7);
    }

    #[test]
    fn test_throw_only_when_failed() {
        let ok = response(204, "");
        assert!(ok.throw().is_ok());

        let resp = response(404, "not found");
        let err = resp.throw().unwrap_err();
        let Error::Request(req) = err else { panic!("expected request error") };
        assert!(req.response().ptr_eq(&resp));
        assert!(req.to_string().contains("404"));
        assert!(req.to_string().contains("not found"));
    }

    #[test]
    fn test_throw_with_notifies_then_fails() {
        let resp = response(503, "");
        let mut seen = None;
        let result = resp.throw_with(|r, e| seen = Some((r.status_code(), e.message().to_string())));
        assert!(result.is_err());
        let (status, message) = seen.unwrap();
        assert_eq!(status, 503);
        assert_eq!(message, "HTTP request returned status code 503");
    }

    #[test]
    fn test_on_error() {
        let mut calls = 0;
        response(500, "").on_error(|_| calls += 1).on_error(|_| calls += 1);
        response(200, "").on_error(|_| calls += 1);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_mutation_is_logic_error() {
        let resp = response(200, "{}");
        assert!(matches!(resp.insert("a", json!(1)), Err(Error::Logic(_))));
        assert!(matches!(resp.remove("a"), Err(Error::Logic(_))));
    }

    #[test]
    fn test_header_and_reason() {
        let raw = RawResponse::new(StatusCode::NOT_FOUND, "")
            .with_header("Vary", "Accept")
            .with_header("Vary", "Origin");
        let resp = HttpResponse::new(raw, None);
        assert_eq!(resp.header("vary").unwrap(), "Accept, Origin");
        assert!(resp.header("x-missing").is_none());
        assert_eq!(resp.reason(), "Not Found");
    }

    #[test]
    fn test_save_as() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("downloads");
        let resp = response(200, "%PDF-1.4 body");

        let path = resp.save_as(&target, 0o755, false).unwrap();
        assert_eq!(path.extension().unwrap(), "pdf");
        assert_eq!(path.file_stem().unwrap().len(), SAVED_NAME_LEN);
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body");
    }
}

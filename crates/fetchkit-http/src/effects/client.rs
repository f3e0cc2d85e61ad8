use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::middleware::{BeforeSending, CookieCapture, CookieSlot, HandlerStack, Middleware};
use super::response::HttpResponse;
use super::transport::{Transport, TransportRequest};
use crate::core::form::{form_pairs, scalar_string};
use crate::data::{Auth, Body, BodyFormat, ClientDefaults, CookieJar, IpVersion, Part, RequestOptions, TransferStats};
use crate::error::{Error, Result};

type Hook = dyn Fn(&mut TransportRequest) + Send + Sync;

/// A chainable, blocking HTTP request builder.
///
/// Configuration calls accumulate on the client and apply to every later
/// request. The body staged for a single request (raw content, attached
/// files) is cleared after each send, whether it succeeded or not.
///
/// ```no_run
/// use fetchkit_http::HttpClient;
/// use serde_json::json;
///
/// let mut client = HttpClient::new();
/// let response = client
///     .as_json()
///     .with_token("s3cr3t", "Bearer")
///     .post("https://api.example.com/items", json!({"name": "x"}))?;
/// assert!(response.successful());
/// # Ok::<(), fetchkit_http::Error>(())
/// ```
pub struct HttpClient {
    defaults: RequestOptions,
    options: RequestOptions,
    body_format: BodyFormat,
    pending_body: Option<Bytes>,
    pending_files: Vec<Part>,
    middleware: Vec<Arc<dyn Middleware>>,
    before_sending: Option<Arc<Hook>>,
    transport: Arc<dyn Transport>,
    stack: Option<HandlerStack>,
    cookie_slot: CookieSlot,
    cookies: Option<CookieJar>,
    transfer_stats: Option<TransferStats>,
    sink: Option<PathBuf>,
}

impl Default for HttpClient {
    fn default() -> Self { Self::new() }
}

impl HttpClient {
    /// A client starting from the process-wide [`ClientDefaults`].
    pub fn new() -> Self { Self::with_defaults(&ClientDefaults::global()) }

    pub fn with_defaults(defaults: &ClientDefaults) -> Self {
        Self {
            defaults: defaults.to_options(),
            options: RequestOptions::new(),
            body_format: BodyFormat::Form,
            pending_body: None,
            pending_files: Vec::new(),
            middleware: Vec::new(),
            before_sending: None,
            transport: default_transport(),
            stack: None,
            cookie_slot: CookieSlot::default(),
            cookies: None,
            transfer_stats: None,
            sink: None,
        }
    }

    /// Restrict every client created afterwards to IPv4.
    pub fn only_ipv4() { ClientDefaults::update_global(|d| d.ip_version = IpVersion::V4) }

    /// Restrict every client created afterwards to IPv6.
    pub fn only_ipv6() { ClientDefaults::update_global(|d| d.ip_version = IpVersion::V6) }

    pub fn options(&self) -> &RequestOptions { &self.options }

    pub fn body_format(&self) -> BodyFormat { self.body_format }

    pub fn pending_body(&self) -> Option<&Bytes> { self.pending_body.as_ref() }

    pub fn pending_files(&self) -> &[Part] { &self.pending_files }

    /// The cookie jar of the most recent request, including cookies set by
    /// its response.
    pub fn cookies(&self) -> Option<&CookieJar> { self.cookies.as_ref() }

    /// Stats of the most recent completed transfer.
    pub fn transfer_stats(&self) -> Option<&TransferStats> { self.transfer_stats.as_ref() }

    /// Resolve relative request URLs against `url`.
    pub fn base_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.options.base_url = Some(url.into());
        self
    }

    fn set_body_format(&mut self, format: BodyFormat) -> &mut Self {
        if self.body_format != format {
            self.body_format = format;
            self.clear_pending();
        }
        self
    }

    pub fn as_json(&mut self) -> &mut Self { self.set_body_format(BodyFormat::Json).content_type("application/json") }

    pub fn as_form(&mut self) -> &mut Self {
        self.set_body_format(BodyFormat::Form)
            .content_type("application/x-www-form-urlencoded")
    }

    /// The boundary-carrying `Content-Type` is produced by the transport.
    pub fn as_multipart(&mut self) -> &mut Self {
        self.set_body_format(BodyFormat::Multipart);
        self.options.headers.remove("content-type");
        self
    }

    /// Send `content` verbatim as the body of the next request.
    pub fn with_body(&mut self, content: impl Into<Bytes>, content_type: &str) -> &mut Self {
        self.set_body_format(BodyFormat::Raw);
        self.pending_body = Some(content.into());
        self.content_type(content_type)
    }

    /// Stage a file part for the next request, switching to multipart.
    pub fn attach(&mut self, part: Part) -> &mut Self {
        self.as_multipart();
        self.pending_files.push(part);
        self
    }

    pub fn attach_many(&mut self, parts: impl IntoIterator<Item = Part>) -> &mut Self {
        for part in parts {
            self.attach(part);
        }
        self
    }

    pub fn content_type(&mut self, content_type: &str) -> &mut Self { self.with_header("Content-Type", content_type) }

    pub fn accept(&mut self, content_type: &str) -> &mut Self { self.with_header("Accept", content_type) }

    pub fn accept_json(&mut self) -> &mut Self { self.accept("application/json") }

    pub fn with_headers<K, V>(&mut self, headers: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.options.headers.append(name, value);
        }
        self
    }

    pub fn with_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.headers.append(name, value);
        self
    }

    pub fn with_basic_auth(&mut self, username: impl Into<String>, password: impl Into<String>) -> &mut Self {
        self.options.auth = Some(Auth::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_digest_auth(&mut self, username: impl Into<String>, password: impl Into<String>) -> &mut Self {
        self.options.auth = Some(Auth::Digest {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// `Authorization: {kind} {token}`, e.g. `kind = "Bearer"`.
    pub fn with_token(&mut self, token: &str, kind: &str) -> &mut Self {
        self.with_authorization(&format!("{kind} {token}"))
    }

    pub fn with_authorization(&mut self, value: &str) -> &mut Self {
        self.options.headers.set("Authorization", value.trim());
        self
    }

    pub fn with_user_agent(&mut self, user_agent: &str) -> &mut Self { self.with_header("User-Agent", user_agent) }

    pub fn with_referer(&mut self, referer: &str) -> &mut Self { self.with_header("Referer", referer) }

    pub fn with_origin(&mut self, origin: &str) -> &mut Self { self.with_header("Origin", origin) }

    /// Send `cookies` to `domain` and its subdomains.
    pub fn with_cookies<K, V>(&mut self, cookies: impl IntoIterator<Item = (K, V)>, domain: &str) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let jar = CookieJar::from_pairs(cookies, domain);
        match &mut self.options.cookies {
            Some(existing) => existing.merge(&jar),
            None => self.options.cookies = Some(jar),
        }
        self
    }

    pub fn with_only_ipv4(&mut self) -> &mut Self {
        self.options.ip_version = Some(IpVersion::V4);
        self
    }

    pub fn with_only_ipv6(&mut self) -> &mut Self {
        self.options.ip_version = Some(IpVersion::V6);
        self
    }

    pub fn without_redirecting(&mut self) -> &mut Self {
        self.options.allow_redirects = Some(false);
        self
    }

    /// Follow at most `max` redirects.
    pub fn max_redirects(&mut self, max: usize) -> &mut Self {
        self.options.allow_redirects = Some(true);
        self.options.max_redirects = Some(max);
        self
    }

    /// Accept invalid TLS certificates.
    pub fn without_verifying(&mut self) -> &mut Self {
        self.options.verify = Some(false);
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    pub fn with_proxy(&mut self, proxy: impl Into<String>) -> &mut Self {
        self.options.proxy = Some(proxy.into());
        self
    }

    /// Fail `send` with [`Error::Request`] on 4xx/5xx responses.
    pub fn with_http_errors(&mut self, enabled: bool) -> &mut Self {
        self.options.http_errors = Some(enabled);
        self
    }

    /// Also write every response body to `path`.
    pub fn sink(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sink = Some(path.into());
        self
    }

    pub fn with_options(&mut self, options: &RequestOptions) -> &mut Self {
        self.options.merge(options);
        self
    }

    /// Append middleware. Layers run in registration order.
    ///
    /// The stack is built on the first send; middleware added after that
    /// takes effect once [`reset_handler_stack`](Self::reset_handler_stack)
    /// is called.
    pub fn with_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Mutate each request after the cookie stage and before user
    /// middleware.
    pub fn before_sending(&mut self, hook: impl Fn(&mut TransportRequest) + Send + Sync + 'static) -> &mut Self {
        self.before_sending = Some(Arc::new(hook));
        self
    }

    pub fn reset_handler_stack(&mut self) -> &mut Self {
        self.stack = None;
        self
    }

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = transport;
        self
    }

    fn build_stack(&self) -> HandlerStack {
        let mut layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(CookieCapture::new(self.cookie_slot.clone()))];
        if let Some(hook) = &self.before_sending {
            layers.push(Arc::new(BeforeSending::new(hook.clone())));
        }
        layers.extend(self.middleware.iter().cloned());
        tracing::trace!(layers = layers.len(), "built handler stack");
        HandlerStack::new(layers)
    }

    /// Encode `data` under the active body format. `null` means no body.
    fn body_from(&self, data: impl Serialize) -> Result<Option<Body>> {
        let value = serde_json::to_value(data)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(match self.body_format {
            BodyFormat::Form => Some(Body::Form(field_pairs(&value))),
            BodyFormat::Json => Some(Body::Json(value)),
            BodyFormat::Multipart => Some(Body::Multipart(parts_from(&value))),
            BodyFormat::Raw => None,
        })
    }

    fn with_data(&self, data: impl Serialize) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();
        options.body = self.body_from(data)?;
        Ok(options)
    }

    fn with_query(query: impl Serialize) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();
        options.query = match serde_json::to_value(query)? {
            Value::String(raw) => url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect(),
            value => field_pairs(&value),
        };
        Ok(options)
    }

    /// Send with options built from the caller's data. When building fails
    /// the staged body and files are still discarded.
    fn send_built(&mut self, method: Method, url: &str, options: Result<RequestOptions>) -> Result<HttpResponse> {
        match options {
            Ok(options) => self.send(method, url, options),
            Err(e) => {
                self.clear_pending();
                Err(e)
            }
        }
    }

    fn clear_pending(&mut self) {
        self.pending_body = None;
        self.pending_files.clear();
    }

    /// GET with `query` (a map, a sequence of pairs, a raw query string or
    /// `()` for none).
    pub fn get(&mut self, url: &str, query: impl Serialize) -> Result<HttpResponse> {
        let options = Self::with_query(query);
        self.send_built(Method::GET, url, options)
    }

    pub fn head(&mut self, url: &str, query: impl Serialize) -> Result<HttpResponse> {
        let options = Self::with_query(query);
        self.send_built(Method::HEAD, url, options)
    }

    pub fn post(&mut self, url: &str, data: impl Serialize) -> Result<HttpResponse> {
        let options = self.with_data(data);
        self.send_built(Method::POST, url, options)
    }

    pub fn put(&mut self, url: &str, data: impl Serialize) -> Result<HttpResponse> {
        let options = self.with_data(data);
        self.send_built(Method::PUT, url, options)
    }

    pub fn patch(&mut self, url: &str, data: impl Serialize) -> Result<HttpResponse> {
        let options = self.with_data(data);
        self.send_built(Method::PATCH, url, options)
    }

    /// DELETE; empty data (null, `{}`, `[]` or `""`) sends no body.
    pub fn delete(&mut self, url: &str, data: impl Serialize) -> Result<HttpResponse> {
        let options = serde_json::to_value(data).map_err(Error::from).and_then(|value| {
            if is_empty(&value) {
                Ok(RequestOptions::new())
            } else {
                self.with_data(value)
            }
        });
        self.send_built(Method::DELETE, url, options)
    }

    /// POST `text` as `text/plain`.
    pub fn post_text(&mut self, url: &str, text: impl Into<String>) -> Result<HttpResponse> {
        self.with_body(text.into(), "text/plain");
        self.send(Method::POST, url, RequestOptions::new())
    }

    pub fn get_json<T: DeserializeOwned>(&mut self, url: &str, query: impl Serialize) -> Result<T> {
        self.accept_json().get(url, query)?.object()
    }

    pub fn post_json<T: DeserializeOwned>(&mut self, url: &str, data: impl Serialize) -> Result<T> {
        self.as_json().accept_json().post(url, data)?.object()
    }

    pub fn put_json<T: DeserializeOwned>(&mut self, url: &str, data: impl Serialize) -> Result<T> {
        self.as_json().accept_json().put(url, data)?.object()
    }

    pub fn patch_json<T: DeserializeOwned>(&mut self, url: &str, data: impl Serialize) -> Result<T> {
        self.as_json().accept_json().patch(url, data)?.object()
    }

    pub fn delete_json<T: DeserializeOwned>(&mut self, url: &str, data: impl Serialize) -> Result<T> {
        self.as_json().accept_json().delete(url, data)?.object()
    }

    /// Move the staged body and files into `options`, leaving nothing
    /// pending on the client.
    fn fold_pending(&mut self, options: &mut RequestOptions) {
        let raw = self.pending_body.take();
        let files = mem::take(&mut self.pending_files);

        match self.body_format {
            BodyFormat::Raw => {
                if let Some(content) = raw {
                    let content_type = options
                        .headers
                        .get_line("content-type")
                        .or_else(|| self.options.headers.get_line("content-type"))
                        .unwrap_or_default();
                    options.body = Some(Body::Raw { content, content_type });
                }
            }
            BodyFormat::Multipart => {
                let mut parts = match options.body.take() {
                    Some(Body::Multipart(parts)) => parts,
                    Some(Body::Form(pairs)) => pairs.into_iter().map(|(k, v)| Part::new(k, v)).collect(),
                    Some(Body::Json(value)) => parts_from(&value),
                    Some(Body::Raw { content, .. }) => vec![Part::new("body", content)],
                    None => Vec::new(),
                };
                parts.extend(files);
                if !parts.is_empty() {
                    options.body = Some(Body::Multipart(parts));
                }
            }
            BodyFormat::Form | BodyFormat::Json => {}
        }
    }

    /// Send a request through the handler stack.
    ///
    /// `options` are merged over the client's options, which are merged
    /// over its defaults. Only connection-level failures are errors unless
    /// `http_errors` is enabled.
    pub fn send(&mut self, method: Method, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        let mut call = options;
        self.fold_pending(&mut call);

        let merged = self.defaults.clone().merged(&self.options).merged(&call);
        let target = resolve_url(merged.base_url.as_deref(), url, &merged.query)?;
        let http_errors = merged.http_errors.unwrap_or(false);

        let stack = match &self.stack {
            Some(stack) => stack.clone(),
            None => {
                let stack = self.build_stack();
                self.stack = Some(stack.clone());
                stack
            }
        };

        tracing::debug!(%method, url = %target, "sending request");
        let result = stack.dispatch(self.transport.as_ref(), TransportRequest::new(method, target.clone(), merged));

        let captured = self.cookie_slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(jar) = &captured {
            self.cookies = Some(jar.clone());
            self.options.cookies = Some(jar.clone());
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(source) if source.is_connection() => {
                tracing::warn!(url = %target, error = %source, "connection failed");
                return Err(Error::Connection {
                    url: target.to_string(),
                    source,
                });
            }
            Err(source) => return Err(Error::Transport(source.to_string())),
        };

        self.transfer_stats = raw.stats.clone();
        let response = HttpResponse::new(raw, captured);
        tracing::debug!(status = response.status_code(), url = %target, "received response");

        if let Some(path) = &self.sink {
            fetchkit_fs::put(path, response.bytes(), false)?;
        }
        if http_errors {
            response.throw()?;
        }
        Ok(response)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("options", &self.options)
            .field("body_format", &self.body_format)
            .field("pending_files", &self.pending_files.len())
            .field("middleware", &self.middleware.len())
            .field("stack_built", &self.stack.is_some())
            .finish_non_exhaustive()
    }
}

/// Name/value fields of `value`: a sequence of `(name, value)` pairs is
/// taken as-is, anything else is flattened with bracket notation.
fn field_pairs(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(is_pair) => items
            .iter()
            .map(|pair| (scalar_string(&pair[0]), scalar_string(&pair[1])))
            .collect(),
        _ => form_pairs(value),
    }
}

fn is_pair(value: &Value) -> bool {
    matches!(value, Value::Array(pair) if pair.len() == 2 && pair[0].is_string())
}

fn parts_from(value: &Value) -> Vec<Part> {
    field_pairs(value).into_iter().map(|(k, v)| Part::new(k, v)).collect()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn resolve_url(base: Option<&str>, url: &str, query: &[(String, String)]) -> Result<url::Url> {
    let invalid = || Error::InvalidUrl(format!("String `{url}` is not a valid url."));
    let mut target = match base.filter(|b| !b.is_empty()) {
        Some(base) => url::Url::parse(base)
            .and_then(|b| b.join(url))
            .map_err(|_| invalid())?,
        None => url::Url::parse(url).map_err(|_| invalid())?,
    };
    if !query.is_empty() {
        target.query_pairs_mut().extend_pairs(query);
    }
    Ok(target)
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Arc<dyn Transport> { Arc::new(super::ReqwestTransport::new()) }

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Arc<dyn Transport> {
    use super::transport::{RawResponse, TransportError};

    fn unconfigured(_: TransportRequest) -> std::result::Result<RawResponse, TransportError> {
        Err(TransportError::Build("no transport configured".into()))
    }
    Arc::new(unconfigured)
}

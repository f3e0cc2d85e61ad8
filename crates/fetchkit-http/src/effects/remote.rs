//! One-shot inspection helpers built on [`HttpClient`]: response headers,
//! CORS checks, page metadata and connection details. Certificate lookups
//! go through a raw TLS handshake instead.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::Serialize;

use super::client::HttpClient;
use super::response::HttpResponse;
use super::tls;
use super::transport::{Transport, TransportError};
use crate::core::{SslCertificate, Url, head_tags};
use crate::data::RequestOptions;
use crate::error::Result;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

const INFO_MAX_REDIRECTS: u32 = 3;

type Resolver = dyn Fn(&str) -> Option<Ipv4Addr> + Send + Sync;

/// DER chain presented by `host:port`, leaf first.
type CertSource = dyn Fn(&str, u16, Duration) -> std::result::Result<Vec<Vec<u8>>, TransportError> + Send + Sync;

/// Title, keywords and description of a site's landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub hostname: String,
    pub ip: Ipv4Addr,
    /// Whether the page was served over HTTPS.
    pub https: bool,
    pub title: String,
    pub keywords: String,
    pub description: String,
    pub meta: BTreeMap<String, String>,
}

/// What a fresh connection to a URL looked like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub url: String,
    pub effective_url: String,
    pub status: u16,
    /// Seconds spent across all hops.
    pub total_time: f64,
    pub remote_addr: Option<SocketAddr>,
    pub http_version: Option<String>,
    pub redirect_count: u32,
    /// Status line and header block of the final response.
    pub response_header: String,
}

/// Entry point for the inspection helpers, with an injectable transport,
/// host resolver and certificate source.
#[derive(Clone)]
pub struct Remote {
    transport: Option<Arc<dyn Transport>>,
    resolver: Arc<Resolver>,
    certs: Arc<CertSource>,
}

impl Default for Remote {
    fn default() -> Self {
        Self {
            transport: None,
            resolver: Arc::new(resolve_ipv4),
            certs: Arc::new(tls::peer_certificates),
        }
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    (host, 0).to_socket_addrs().ok()?.find_map(|addr| match addr {
        SocketAddr::V4(v4) => Some(*v4.ip()),
        SocketAddr::V6(_) => None,
    })
}

impl Remote {
    pub fn new() -> Self { Self::default() }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_resolver(mut self, resolver: impl Fn(&str) -> Option<Ipv4Addr> + Send + Sync + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_cert_source(
        mut self,
        source: impl Fn(&str, u16, Duration) -> std::result::Result<Vec<Vec<u8>>, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.certs = Arc::new(source);
        self
    }

    /// A fresh client, so each helper call opens its own connections.
    fn client(&self) -> HttpClient {
        let mut client = HttpClient::new();
        if let Some(transport) = &self.transport {
            client.set_transport(transport.clone());
        }
        client
    }

    /// Response headers of a GET, names lower-cased.
    pub fn get_headers<K, V>(
        &self,
        url: &str,
        headers: impl IntoIterator<Item = (K, V)>,
        timeout: Duration,
    ) -> Result<BTreeMap<String, Vec<String>>>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let response = self
            .client()
            .without_verifying()
            .with_headers(headers)
            .timeout(timeout)
            .get(url, ())?;
        Ok(header_lists(&response))
    }

    /// Whether `url` allows cross-origin requests from `origin`.
    pub fn check_cors(&self, url: &str, origin: &str, timeout: Duration) -> Result<bool> {
        let headers = self.get_headers(url, [("Referer", origin), ("Origin", origin)], timeout)?;
        Ok(headers
            .get("access-control-allow-origin")
            .and_then(|values| values.first())
            .is_some_and(|allowed| allowed == origin || allowed == "*"))
    }

    /// The body of `url` fetched with a browser user agent, or `None` on any
    /// failure.
    pub fn get_remote_content(&self, url: &str, timeout: Duration) -> Option<String> {
        let result = self
            .client()
            .without_verifying()
            .timeout(timeout)
            .with_user_agent(BROWSER_USER_AGENT)
            .get(url, ());
        match result {
            Ok(response) => Some(response.body().into_owned()),
            Err(e) => {
                tracing::debug!(url, error = %e, "remote content unavailable");
                None
            }
        }
    }

    /// Download `url` into `dir` under a generated name. Error statuses fail.
    pub fn save_remote_file_as(&self, url: &str, dir: impl AsRef<Path>, mode: u32, lock: bool) -> Result<PathBuf> {
        let response = self.client().with_user_agent(BROWSER_USER_AGENT).get(url, ())?;
        response.throw()?.save_as(dir, mode, lock)
    }

    /// Host name of `url` per [`Url`], `None` when it does not parse.
    pub fn url_hostname(url: &str) -> Option<String> { Url::parse(url).ok().map(|u| u.host().to_string()) }

    /// Title / keywords / description of the site hosting `url`, trying
    /// HTTPS first. `None` when the host does not resolve or neither scheme
    /// answers.
    pub fn get_tdk(&self, url: &str, timeout: Duration) -> Option<PageInfo> {
        let hostname = Self::url_hostname(url)?;
        let ip = (self.resolver)(&hostname)?;

        let (https, body) = [(true, "https"), (false, "http")]
            .into_iter()
            .find_map(|(https, scheme)| {
                self.get_remote_content(&format!("{scheme}://{hostname}"), timeout)
                    .filter(|body| !body.is_empty())
                    .map(|body| (https, body))
            })?;

        let tags = head_tags(&body);
        Some(PageInfo {
            hostname,
            ip,
            https,
            title: tags.title,
            keywords: tags.keywords,
            description: tags.description,
            meta: tags.meta,
        })
    }

    /// Open a fresh connection to `url`, following up to three redirects
    /// with `Referer` set to the previous hop. `None` when no response was
    /// received.
    pub fn get_info(&self, url: &str, connect_timeout: Duration, timeout: Duration) -> Option<ConnectionInfo> {
        let mut client = self.client();
        client
            .without_redirecting()
            .without_verifying()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .with_user_agent(BROWSER_USER_AGENT);

        let mut current = url.to_string();
        let mut options = RequestOptions::new();
        let mut redirects = 0;
        let mut total = Duration::ZERO;

        loop {
            let response = match client.send(Method::GET, &current, options) {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %current, error = %e, "connection info unavailable");
                    return None;
                }
            };
            if let Some(stats) = response.transfer_stats() {
                total += stats.total_time;
            }

            let next = response
                .header("location")
                .filter(|_| response.redirect() && redirects < INFO_MAX_REDIRECTS)
                .and_then(|location| url::Url::parse(&current).ok()?.join(&location).ok());
            match next {
                Some(next) => {
                    options = RequestOptions::new().header("Referer", current.as_str());
                    current = next.to_string();
                    redirects += 1;
                }
                None => {
                    let stats = response.transfer_stats();
                    return Some(ConnectionInfo {
                        url: url.to_string(),
                        effective_url: stats.map_or_else(|| current.clone(), |s| s.effective_uri.to_string()),
                        status: response.status_code(),
                        total_time: total.as_secs_f64(),
                        remote_addr: stats.and_then(|s| s.remote_addr),
                        http_version: stats.and_then(|s| s.http_version.clone()),
                        redirect_count: redirects,
                        response_header: header_block(&response),
                    });
                }
            }
        }
    }

    /// Every certificate `host:port` presents, leaf first, decoded without
    /// verifying the chain. `None` when the handshake fails, the server sends
    /// no certificate or any of them does not decode.
    pub fn get_ssl_cert_chain(&self, host: &str, port: u16, timeout: Duration) -> Option<Vec<SslCertificate>> {
        let chain = match (self.certs)(host, port, timeout) {
            Ok(chain) => chain,
            Err(e) => {
                tracing::debug!(host, port, error = %e, "certificate chain unavailable");
                return None;
            }
        };
        if chain.is_empty() {
            tracing::debug!(host, port, "server presented no certificate");
            return None;
        }
        chain
            .iter()
            .map(|der| SslCertificate::from_der(der))
            .collect::<std::result::Result<Vec<_>, _>>()
            .inspect_err(|e| tracing::debug!(host, port, error = %e, "certificate did not decode"))
            .ok()
    }

    /// The leaf certificate of `host:port`, see
    /// [`get_ssl_cert_chain`](Self::get_ssl_cert_chain).
    pub fn get_ssl_cert(&self, host: &str, port: u16, timeout: Duration) -> Option<SslCertificate> {
        self.get_ssl_cert_chain(host, port, timeout)?.into_iter().next()
    }
}

fn header_lists(response: &HttpResponse) -> BTreeMap<String, Vec<String>> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in response.headers() {
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

fn header_block(response: &HttpResponse) -> String {
    let mut block = format!(
        "{:?} {} {}\r\n",
        response.version(),
        response.status_code(),
        response.reason()
    );
    for (name, value) in response.headers() {
        let _ = write!(block, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
    }
    block.push_str("\r\n");
    block
}

pub fn get_headers<K, V>(
    url: &str,
    headers: impl IntoIterator<Item = (K, V)>,
    timeout: Duration,
) -> Result<BTreeMap<String, Vec<String>>>
where
    K: Into<String>,
    V: Into<String>,
{
    Remote::new().get_headers(url, headers, timeout)
}

pub fn check_cors(url: &str, origin: &str, timeout: Duration) -> Result<bool> { Remote::new().check_cors(url, origin, timeout) }

pub fn get_remote_content(url: &str, timeout: Duration) -> Option<String> { Remote::new().get_remote_content(url, timeout) }

pub fn save_remote_file_as(url: &str, dir: impl AsRef<Path>, mode: u32, lock: bool) -> Result<PathBuf> {
    Remote::new().save_remote_file_as(url, dir, mode, lock)
}

pub fn url_hostname(url: &str) -> Option<String> { Remote::url_hostname(url) }

pub fn get_tdk(url: &str, timeout: Duration) -> Option<PageInfo> { Remote::new().get_tdk(url, timeout) }

pub fn get_info(url: &str, connect_timeout: Duration, timeout: Duration) -> Option<ConnectionInfo> {
    Remote::new().get_info(url, connect_timeout, timeout)
}

pub fn get_ssl_cert(host: &str, port: u16, timeout: Duration) -> Option<SslCertificate> {
    Remote::new().get_ssl_cert(host, port, timeout)
}

pub fn get_ssl_cert_chain(host: &str, port: u16, timeout: Duration) -> Option<Vec<SslCertificate>> {
    Remote::new().get_ssl_cert_chain(host, port, timeout)
}

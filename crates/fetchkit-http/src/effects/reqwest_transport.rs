use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, WWW_AUTHENTICATE};
use http::StatusCode;
use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::redirect::Policy;

use super::transport::{RawResponse, Transport, TransportError, TransportRequest};
use crate::core::digest;
use crate::data::{Auth, Body, IpVersion, RequestOptions, TransferStats};

const DEFAULT_MAX_REDIRECTS: usize = 5;

/// The connection-level settings a `reqwest` client is built with. Requests
/// that agree on these share a client and its connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    verify: bool,
    redirects: Option<usize>,
    ip_version: IpVersion,
    proxy: Option<String>,
    connect_timeout: Option<Duration>,
}

impl ClientKey {
    fn from_options(options: &RequestOptions) -> Self {
        let redirects = match options.allow_redirects {
            Some(false) => None,
            _ => Some(options.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS)),
        };
        Self {
            verify: options.verify.unwrap_or(true),
            redirects,
            ip_version: options.ip_version.unwrap_or_default(),
            proxy: options.proxy.clone(),
            connect_timeout: options.connect_timeout,
        }
    }

    fn build(&self) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .timeout(None::<Duration>)
            .danger_accept_invalid_certs(!self.verify)
            .redirect(match self.redirects {
                Some(max) => Policy::limited(max),
                None => Policy::none(),
            });

        builder = match self.ip_version {
            IpVersion::Any => builder,
            IpVersion::V4 => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            IpVersion::V6 => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        };
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| TransportError::Build(format!("proxy `{proxy}`: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        builder.build().map_err(map_error)
    }
}

/// Production transport on top of `reqwest`'s blocking client.
///
/// HTTP error statuses are returned as ordinary responses. Digest
/// authentication answers one `401` challenge per request.
#[derive(Default)]
pub struct ReqwestTransport {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self { Self::default() }

    fn client(&self, key: ClientKey) -> Result<Client, TransportError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = key.build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn execute(&self, client: &Client, request: &TransportRequest, authorization: Option<&str>) -> Result<RawResponse, TransportError> {
        let started = Instant::now();
        let response = build_request(client, request, authorization)?.send().map_err(map_error)?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let mut stats = TransferStats::new(response.url().clone(), Duration::ZERO);
        stats.remote_addr = response.remote_addr();
        stats.http_version = Some(format!("{version:?}"));

        let body = response.bytes().map_err(map_error)?;
        stats.total_time = started.elapsed();

        Ok(RawResponse {
            status,
            version,
            headers,
            body,
            stats: Some(stats),
        })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pooled = self.clients.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("ReqwestTransport").field("clients", &pooled).finish()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let client = self.client(ClientKey::from_options(&request.options))?;
        let response = self.execute(&client, &request, None)?;

        let Some(Auth::Digest { username, password }) = &request.options.auth else {
            return Ok(response);
        };
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(challenge) = response
            .headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(digest::parse_challenge)
        else {
            return Ok(response);
        };

        let target = match request.url.query() {
            Some(query) => format!("{}?{query}", request.url.path()),
            None => request.url.path().to_string(),
        };
        let cnonce = format!("{:016x}", rand::rng().random::<u64>());
        let authorization = digest::authorization(
            &challenge,
            username,
            password,
            request.method.as_str(),
            &target,
            &cnonce,
            1,
        );
        tracing::trace!(url = %request.url, "answering digest challenge");
        self.execute(&client, &request, Some(&authorization))
    }
}

fn build_request(client: &Client, request: &TransportRequest, authorization: Option<&str>) -> Result<RequestBuilder, TransportError> {
    let options = &request.options;
    let multipart_body = matches!(options.body, Some(Body::Multipart(_)));

    let mut builder = client.request(request.method.clone(), request.url.clone());
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    for (name, value) in options.headers.iter() {
        // The multipart encoder supplies its own boundary-carrying type.
        if multipart_body && name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        builder = builder.header(name, value);
    }

    if let Some(jar) = &options.cookies {
        if !options.headers.contains("cookie") {
            if let Some(line) = jar.header_for(request.host()) {
                builder = builder.header(COOKIE, line);
            }
        }
    }

    match (&options.auth, authorization) {
        (_, Some(authorization)) => builder = builder.header(AUTHORIZATION, authorization),
        (Some(Auth::Basic { username, password }), None) => builder = builder.basic_auth(username, Some(password)),
        _ => {}
    }

    builder = match &options.body {
        None => builder,
        Some(Body::Form(pairs)) => builder.form(pairs),
        Some(Body::Json(value)) => {
            let bytes = serde_json::to_vec(value).map_err(|e| TransportError::Build(e.to_string()))?;
            if !options.headers.contains("content-type") {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder.body(bytes)
        }
        Some(Body::Raw { content, content_type }) => {
            if !options.headers.contains("content-type") && !content_type.is_empty() {
                builder = builder.header(CONTENT_TYPE, content_type.as_str());
            }
            builder.body(content.to_vec())
        }
        Some(Body::Multipart(parts)) => {
            let mut form = multipart::Form::new();
            for part in parts {
                let mut piece = multipart::Part::bytes(part.contents.to_vec());
                if let Some(filename) = &part.filename {
                    piece = piece.file_name(filename.clone());
                }
                if !part.headers.is_empty() {
                    piece = piece.headers(header_map(part.headers.iter())?);
                }
                form = form.part(part.name.clone(), piece);
            }
            builder.multipart(form)
        }
    };

    Ok(builder)
}

fn header_map<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::try_from(name).map_err(|e| TransportError::Build(format!("header `{name}`: {e}")))?;
        let value = HeaderValue::try_from(value).map_err(|e| TransportError::Build(format!("header `{name}`: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_builder() {
        TransportError::Build(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_redirect_policy() {
        let key = ClientKey::from_options(&RequestOptions::new());
        assert_eq!(key.redirects, Some(DEFAULT_MAX_REDIRECTS));
        assert!(key.verify);

        let options = RequestOptions {
            allow_redirects: Some(false),
            verify: Some(false),
            ..Default::default()
        };
        let key = ClientKey::from_options(&options);
        assert_eq!(key.redirects, None);
        assert!(!key.verify);
    }

    #[test]
    fn test_clients_are_pooled_by_key() {
        let transport = ReqwestTransport::new();
        let options = RequestOptions::new();
        transport.client(ClientKey::from_options(&options)).unwrap();
        transport.client(ClientKey::from_options(&options)).unwrap();
        let v4 = RequestOptions {
            ip_version: Some(IpVersion::V4),
            ..Default::default()
        };
        transport.client(ClientKey::from_options(&v4)).unwrap();
        assert_eq!(transport.clients.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_proxy_is_build_error() {
        let options = RequestOptions {
            proxy: Some("::not a proxy::".into()),
            ..Default::default()
        };
        let err = ClientKey::from_options(&options).build().unwrap_err();
        assert!(matches!(err, TransportError::Build(_)));
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let transport = ReqwestTransport::new();
        let options = RequestOptions {
            connect_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let url = url::Url::parse("http://127.0.0.1:1/").unwrap();
        let err = transport
            .send(TransportRequest::new(http::Method::GET, url, options))
            .unwrap_err();
        assert!(err.is_connection(), "{err}");
    }
}

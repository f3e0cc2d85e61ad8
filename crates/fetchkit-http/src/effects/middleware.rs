//! The handler stack: an ordered list of middleware wrapped around a
//! transport.
//!
//! Each middleware receives the request and a [`Next`] handle for the rest
//! of the stack. It can rewrite the request, short-circuit with its own
//! response, or inspect the response coming back.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use http::header::SET_COOKIE;

use super::transport::{RawResponse, Transport, TransportError, TransportRequest};
use crate::data::{CookieJar, TransferStats};

pub type MiddlewareResult = Result<RawResponse, TransportError>;

pub trait Middleware: Send + Sync {
    fn handle(&self, request: TransportRequest, next: Next<'_>) -> MiddlewareResult;
}

/// The remainder of the stack below the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn run(self, request: TransportRequest) -> MiddlewareResult {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.handle(request, Next {
                layers: rest,
                transport: self.transport,
            }),
            None => dispatch(self.transport, request),
        }
    }
}

/// Innermost stage: send through the transport and record stats when the
/// transport did not.
fn dispatch(transport: &dyn Transport, request: TransportRequest) -> MiddlewareResult {
    let url = request.url.clone();
    let started = Instant::now();
    let mut response = transport.send(request)?;
    if response.stats.is_none() {
        let mut stats = TransferStats::new(url, started.elapsed());
        stats.http_version = Some(format!("{:?}", response.version));
        response.stats = Some(stats);
    }
    Ok(response)
}

pub struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(TransportRequest, Next<'_>) -> MiddlewareResult + Send + Sync,
{
    fn handle(&self, request: TransportRequest, next: Next<'_>) -> MiddlewareResult { (self.0)(request, next) }
}

/// Wrap a closure as middleware.
///
/// ```
/// use fetchkit_http::middleware;
///
/// let tag = middleware::from_fn(|mut req, next| {
///     req.options.headers.append("X-Tag", "1");
///     next.run(req)
/// });
/// # let _ = tag;
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(TransportRequest, Next<'_>) -> MiddlewareResult + Send + Sync,
{
    FnMiddleware(f)
}

/// An ordered, immutable list of middleware.
#[derive(Clone, Default)]
pub struct HandlerStack {
    layers: Vec<Arc<dyn Middleware>>,
}

impl HandlerStack {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self { Self { layers } }

    pub fn len(&self) -> usize { self.layers.len() }

    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Run `request` through every layer, in order, then the transport.
    pub fn dispatch(&self, transport: &dyn Transport, request: TransportRequest) -> MiddlewareResult {
        Next {
            layers: &self.layers,
            transport,
        }
        .run(request)
    }
}

impl std::fmt::Debug for HandlerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerStack").field("layers", &self.layers.len()).finish()
    }
}

/// Shared slot the cookie stage writes into and the client reads back.
pub type CookieSlot = Arc<Mutex<Option<CookieJar>>>;

/// Records the cookie jar a request was sent with, plus any `Set-Cookie`
/// headers in its response.
pub struct CookieCapture {
    slot: CookieSlot,
}

impl CookieCapture {
    pub fn new(slot: CookieSlot) -> Self { Self { slot } }
}

impl Middleware for CookieCapture {
    fn handle(&self, request: TransportRequest, next: Next<'_>) -> MiddlewareResult {
        let host = request.host().to_string();
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = request.options.cookies.clone();

        let response = next.run(request)?;

        let set_cookies: Vec<&str> = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !set_cookies.is_empty() {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let jar = slot.get_or_insert_with(CookieJar::new);
            for header in set_cookies {
                jar.store_set_cookie(header, &host);
            }
        }
        Ok(response)
    }
}

type Hook = dyn Fn(&mut TransportRequest) + Send + Sync;

/// Mutates each request before it reaches user middleware.
pub struct BeforeSending {
    hook: Arc<Hook>,
}

impl BeforeSending {
    pub fn new(hook: Arc<Hook>) -> Self { Self { hook } }
}

impl Middleware for BeforeSending {
    fn handle(&self, mut request: TransportRequest, next: Next<'_>) -> MiddlewareResult {
        (self.hook)(&mut request);
        next.run(request)
    }
}

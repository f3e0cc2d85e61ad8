#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fetchkit_http::{RawResponse, Transport, TransportError, TransportRequest};
use http::StatusCode;

type Handler = dyn Fn(&TransportRequest) -> Result<RawResponse, TransportError> + Send + Sync;

/// A transport that answers from a closure and records every request.
pub struct Stub {
    handler: Box<Handler>,
    seen: Mutex<Vec<TransportRequest>>,
}

impl Stub {
    pub fn new(
        handler: impl Fn(&TransportRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(status: u16, body: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(RawResponse::new(StatusCode::from_u16(status).unwrap(), body)))
    }

    pub fn refuse() -> Arc<Self> { Self::new(|_| Err(TransportError::Connect("connection refused".into()))) }

    pub fn requests(&self) -> Vec<TransportRequest> { self.seen.lock().unwrap().clone() }

    pub fn last(&self) -> TransportRequest { self.requests().pop().expect("no request recorded") }
}

impl Transport for Stub {
    fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let response = (self.handler)(&request);
        self.seen.lock().unwrap().push(request);
        response
    }
}

//! Per-request state shared by every handler in the route walk.
//!
//! # Responsibilities
//! - Expose method, headers, and the resolved URL
//! - Own the body stream until exactly one reader takes it
//! - Hold the materialized payload once a reader produced it
//! - Record whether the body stream was destroyed (oversized entity)
//!
//! # Design Decisions
//! - `Request` is a cheap `Arc` handle so middleware and the final handler
//!   see the same body slot
//! - Locks are never held across an await point

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, Method, Uri, Version};
use url::Url;

use crate::body::Payload;
use crate::http::response::ResponseHeaders;
use crate::routing::Query;

enum BodySlot {
    Unread(Body),
    Taken,
}

struct RequestInner {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    url: Url,
    body: Mutex<BodySlot>,
    payload: OnceLock<Payload>,
    entity_rejected: AtomicBool,
}

/// Handle to an inbound request.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub fn from_parts(parts: Parts, body: Body, url: Url) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
                url,
                body: Mutex::new(BodySlot::Unread(body)),
                payload: OnceLock::new(),
                entity_rejected: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_http(request: axum::http::Request<Body>, url: Url) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body, url)
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// The request target resolved against the configured base URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse().ok())
    }

    /// True while no reader has taken the body stream.
    pub fn is_readable(&self) -> bool {
        matches!(*self.slot(), BodySlot::Unread(_))
    }

    /// Take the body stream. Only the first caller gets it.
    pub(crate) fn take_body(&self) -> Option<Body> {
        match std::mem::replace(&mut *self.slot(), BodySlot::Taken) {
            BodySlot::Unread(body) => Some(body),
            BodySlot::Taken => None,
        }
    }

    /// Payload materialized by the body reader, if any.
    pub fn payload(&self) -> Option<&Payload> {
        self.inner.payload.get()
    }

    pub(crate) fn store_payload(&self, payload: Payload) {
        if self.inner.payload.set(payload).is_err() {
            tracing::warn!("Request payload already materialized; keeping the first");
        }
    }

    pub(crate) fn mark_entity_rejected(&self) {
        self.inner.entity_rejected.store(true, Ordering::Release);
    }

    /// True once the body stream was destroyed because it exceeded a limit.
    pub fn entity_rejected(&self) -> bool {
        self.inner.entity_rejected.load(Ordering::Acquire)
    }

    fn slot(&self) -> MutexGuard<'_, BodySlot> {
        self.inner.body.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("url", &self.inner.url.as_str())
            .field("readable", &self.is_readable())
            .finish()
    }
}

/// Everything a handler is invoked with.
#[derive(Debug, Clone)]
pub struct Context {
    pub request: Request,
    /// Percent-decoded path of the resolved URL.
    pub pathname: Arc<str>,
    pub query: Arc<Query>,
    pub response: ResponseHeaders,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &'static str) -> Request {
        let http = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/upload?x=1")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len().to_string())
            .body(Body::from(body))
            .unwrap();
        Request::from_http(http, Url::parse("http://localhost/upload?x=1").unwrap())
    }

    #[test]
    fn body_can_be_taken_once() {
        let req = request("{}");
        let clone = req.clone();
        assert!(req.is_readable());
        assert!(clone.take_body().is_some());
        assert!(!req.is_readable());
        assert!(req.take_body().is_none());
    }

    #[test]
    fn header_accessors() {
        let req = request("{\"a\":1}");
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.content_length(), Some(7));
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.url().path(), "/upload");
    }

    #[test]
    fn payload_is_set_once() {
        let req = request("");
        req.store_payload(Payload::Text("first".into()));
        req.store_payload(Payload::Text("second".into()));
        assert_eq!(req.payload(), Some(&Payload::Text("first".into())));
    }
}

//! Handler results and response serialization.
//!
//! # Responsibilities
//! - `Reply`: what a handler returns to end the route walk
//! - Map reply bodies to a content type and an HTTP response
//! - Transport-level error payloads (`{ error, message }`)
//!
//! # Design Decisions
//! - Status defaults to 200
//! - Content type defaults from the body variant unless set explicitly
//! - Headers set on a reply win over headers added by pass-through middleware

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};

/// Content types a reply can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Text,
    Html,
    OctetStream,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain; charset=utf-8",
            ContentType::Html => "text/html; charset=utf-8",
            ContentType::OctetStream => "application/octet-stream",
        }
    }
}

/// Body of a handler reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
}

impl ReplyBody {
    fn default_content_type(&self) -> Option<ContentType> {
        match self {
            ReplyBody::Empty => None,
            ReplyBody::Text(_) => Some(ContentType::Text),
            ReplyBody::Json(_) => Some(ContentType::Json),
            ReplyBody::Bytes(_) => Some(ContentType::OctetStream),
        }
    }

    /// JSON view of the body, used in diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ReplyBody::Empty => serde_json::Value::Null,
            ReplyBody::Text(text) => serde_json::Value::String(text.clone()),
            ReplyBody::Json(value) => value.clone(),
            ReplyBody::Bytes(bytes) => {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// A handler result that ends the route walk.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
    pub content_type: Option<ContentType>,
    pub headers: HeaderMap,
}

impl Reply {
    pub fn new(body: ReplyBody) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            content_type: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(ReplyBody::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ReplyBody::Text(text.into()))
    }

    pub fn json(value: impl Into<serde_json::Value>) -> Self {
        Self::new(ReplyBody::Json(value.into()))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(ReplyBody::Bytes(bytes.into()))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Transport-level error reply: `{ "error": code, "message": message }`.
    pub fn wire_error(status: StatusCode, code: &str, message: &str) -> Self {
        Self::json(serde_json::json!({ "error": code, "message": message })).with_status(status)
    }

    pub fn not_found() -> Self {
        Self::wire_error(StatusCode::NOT_FOUND, "not_found", "Not Found")
    }

    pub fn into_response(self) -> Response<Body> {
        let content_type = self.content_type.or_else(|| self.body.default_content_type());
        let body = match self.body {
            ReplyBody::Empty => Body::empty(),
            ReplyBody::Text(text) => Body::from(text),
            ReplyBody::Json(value) => Body::from(value.to_string()),
            ReplyBody::Bytes(bytes) => Body::from(bytes),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type.as_str()));
        }
        response
    }
}

/// Headers contributed by handlers that pass the request on.
///
/// Shared by every handler invoked for one request; merged into the final
/// response without overriding headers the replying handler set itself.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    inner: Arc<Mutex<HeaderMap>>,
}

impl ResponseHeaders {
    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        self.lock().insert(name, value);
    }

    pub fn append(&self, name: HeaderName, value: HeaderValue) {
        self.lock().append(name, value);
    }

    pub fn get(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().get(name).cloned()
    }

    /// Merge the collected headers into `target`, keeping names already present.
    pub fn merge_into(&self, target: &mut HeaderMap) {
        let collected = std::mem::take(&mut *self.lock());
        let mut current: Option<HeaderName> = None;
        for (name, value) in collected {
            if let Some(name) = name {
                current = if target.contains_key(&name) { None } else { Some(name) };
            }
            if let Some(name) = &current {
                target.append(name.clone(), value);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

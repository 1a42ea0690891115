//! Route table construction and lookup.
//!
//! # Responsibilities
//! - Collect handler entries in registration order
//! - Validate redirects at registration time
//! - Freeze entries into an immutable, cheaply cloneable table
//! - Yield the entries matching a method and pathname, in order
//!
//! # Design Decisions
//! - Builder during startup, read-only table afterwards
//! - Shadowing is legal: the earliest matching entry runs first
//! - Only GET, POST, PUT, PATCH and DELETE can be bound to a route

use std::future::Future;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::http::error::Failure;
use crate::http::request::Context;
use crate::http::response::Reply;
use crate::routing::matcher::Matcher;

/// `Ok(Some(reply))` ends the walk; `Ok(None)` passes to the next entry.
pub type HandlerResult = Result<Option<Reply>, Failure>;

pub type BoxHandler = Arc<dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Box an async function as a handler.
pub fn into_handler<F, Fut>(handler: F) -> BoxHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |cx| handler(cx).boxed())
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("redirect source and destination are both {0}")]
    RedirectLoop(String),
    #[error("redirect status {0} is not a 3xx status")]
    InvalidRedirectStatus(u16),
    #[error("redirect destination {0:?} is not a valid header value")]
    InvalidRedirectTarget(String),
    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
}

/// One registered handler.
#[derive(Clone)]
pub struct HandlerEntry {
    method: Option<Method>,
    matcher: Option<Matcher>,
    handler: BoxHandler,
}

impl HandlerEntry {
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    pub fn handler(&self) -> &BoxHandler {
        &self.handler
    }

    /// Unset conditions match everything.
    pub fn matches(&self, method: &Method, pathname: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
            && self.matcher.as_ref().map_or(true, |m| m.matches(pathname))
    }

    /// e.g. `GET /r`, `* ~^/admin`, `* *`.
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.method.as_ref().map_or("*", Method::as_str),
            self.matcher.as_ref().map_or_else(|| "*".to_string(), Matcher::describe),
        )
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandlerEntry").field(&self.label()).finish()
    }
}

const ROUTABLE_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Collects entries before the server starts.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    entries: Vec<HandlerEntry>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, method: Option<Method>, matcher: Option<Matcher>, handler: BoxHandler) -> Self {
        self.entries.push(HandlerEntry {
            method,
            matcher,
            handler,
        });
        self
    }

    /// Register a handler for `method` (or every method when `None`).
    pub fn route<F, Fut>(
        self,
        method: Option<Method>,
        matcher: impl Into<Matcher>,
        handler: F,
    ) -> Result<Self, RouteError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if let Some(method) = &method {
            if !ROUTABLE_METHODS.contains(method) {
                return Err(RouteError::UnsupportedMethod(method.clone()));
            }
        }
        Ok(self.push(method, Some(matcher.into()), into_handler(handler)))
    }

    pub fn get<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Some(Method::GET), Some(matcher.into()), into_handler(handler))
    }

    pub fn post<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Some(Method::POST), Some(matcher.into()), into_handler(handler))
    }

    pub fn put<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Some(Method::PUT), Some(matcher.into()), into_handler(handler))
    }

    pub fn patch<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Some(Method::PATCH), Some(matcher.into()), into_handler(handler))
    }

    pub fn delete<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Some(Method::DELETE), Some(matcher.into()), into_handler(handler))
    }

    /// Middleware for every path and method.
    pub fn middleware<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(None, None, into_handler(handler))
    }

    /// Middleware for every method on matching paths.
    pub fn middleware_at<F, Fut>(self, matcher: impl Into<Matcher>, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(None, Some(matcher.into()), into_handler(handler))
    }

    /// GET `from` answers with `Location: to` and `status` (301 by default).
    pub fn redirect(
        self,
        from: &str,
        to: &str,
        status: Option<StatusCode>,
    ) -> Result<Self, RouteError> {
        if from == to {
            return Err(RouteError::RedirectLoop(from.to_string()));
        }
        let status = status.unwrap_or(StatusCode::MOVED_PERMANENTLY);
        if !status.is_redirection() {
            return Err(RouteError::InvalidRedirectStatus(status.as_u16()));
        }
        let location = HeaderValue::from_str(to)
            .map_err(|_| RouteError::InvalidRedirectTarget(to.to_string()))?;

        Ok(self.get(from, move |_cx| {
            let reply = Reply::empty()
                .with_status(status)
                .with_header(header::LOCATION, location.clone());
            async move { Ok(Some(reply)) }
        }))
    }

    /// Freeze the entries.
    pub fn build(self) -> RouteTable {
        tracing::debug!(entries = self.entries.len(), "Route table built");
        RouteTable {
            entries: self.entries.into(),
        }
    }
}

/// Immutable, ordered handler entries.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Arc<[HandlerEntry]>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching the request, in registration order.
    pub fn matching<'a>(
        &'a self,
        method: &'a Method,
        pathname: &'a str,
    ) -> impl Iterator<Item = &'a HandlerEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.matches(method, pathname))
    }

    pub fn first_match(&self, method: &Method, pathname: &str) -> Option<&HandlerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.matches(method, pathname))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTableBuilder::new().build()
    }
}

//! Per-request route walk.
//!
//! # Responsibilities
//! - Resolve the request target against the base URL
//! - Decode pathname and query parameters
//! - Invoke matching handlers in registration order until one replies
//! - Translate failures exactly once and report them to diagnostics
//!
//! # Design Decisions
//! - Invalid URLs and unmatched routes answer 404 without touching handlers
//! - A handler that returns nothing passes the request to the next entry
//! - A handler panic is an opaque failure; a translator panic drops the connection

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::body::Body as HttpBody;
use tower::Service;
use url::Url;

use crate::config::ServerConfig;
use crate::http::error::{BoxError, ErrorTranslator, Failure};
use crate::http::request::{Context, Request};
use crate::http::response::{Reply, ResponseHeaders};
use crate::observability::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::observability::metrics::{self, Outcome};
use crate::routing::{decode_pathname, decode_query, RouteTable};

/// Returned instead of a response when the connection must be dropped.
#[derive(Debug, thiserror::Error)]
#[error("error translator panicked; dropping connection")]
pub struct DispatchAbort;

#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {0}")]
struct HandlerPanic(String);

/// Owns the frozen route table and everything needed to answer a request.
pub struct Dispatcher {
    routes: RouteTable,
    base_url: Url,
    translator: ErrorTranslator,
    diagnostics: Arc<dyn DiagnosticSink>,
    close_on_rejected_entity: bool,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, base_url: Url) -> Self {
        Self {
            routes,
            base_url,
            translator: ErrorTranslator::default(),
            diagnostics: Arc::new(TracingSink),
            close_on_rejected_entity: true,
        }
    }

    pub fn from_config(config: &ServerConfig, routes: RouteTable) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&config.listener.base_url)?;
        Ok(Self::new(routes, base_url)
            .close_on_rejected_entity(config.limits.close_connection_on_rejected_entity))
    }

    pub fn with_translator(mut self, translator: ErrorTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn close_on_rejected_entity(mut self, close: bool) -> Self {
        self.close_on_rejected_entity = close;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Resolve a request target against the base URL.
    pub fn resolve_url(&self, target: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(target)
    }

    /// Answer one request.
    pub async fn dispatch(
        &self,
        request: axum::http::Request<Body>,
    ) -> Result<Response<Body>, DispatchAbort> {
        let start = Instant::now();
        let method = request.method().clone();
        let target = request.uri().to_string();

        let url = match self.resolve_url(&target) {
            Ok(url) => url,
            Err(e) => {
                self.diagnostics.emit(&Diagnostic::InvalidUrl {
                    url: target,
                    error: e.to_string(),
                });
                metrics::record_request(method.as_str(), 404, Outcome::InvalidUrl, start);
                return Ok(Reply::wire_error(StatusCode::NOT_FOUND, "invalid_url", "Invalid URL")
                    .into_response());
            }
        };

        let pathname: Arc<str> = decode_pathname(&url).into();
        let query = Arc::new(decode_query(url.query()));
        let (parts, body) = request.into_parts();
        let request = Request::from_parts(parts, body, url);
        let cx = Context {
            request: request.clone(),
            pathname: pathname.clone(),
            query,
            response: ResponseHeaders::default(),
        };

        let (reply, outcome) = match self.walk(&cx).await {
            None => {
                tracing::debug!(method = %method, path = %pathname, "No route matched");
                (Reply::not_found(), Outcome::NotFound)
            }
            Some(Ok(reply)) => (reply, Outcome::Handled),
            Some(Err(failure)) => (self.translate(&failure)?, Outcome::Failed),
        };

        let status = reply.status;
        let mut response = reply.into_response();
        cx.response.merge_into(response.headers_mut());
        if self.close_on_rejected_entity && request.entity_rejected() {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        metrics::record_request(method.as_str(), status.as_u16(), outcome, start);
        Ok(response)
    }

    /// `None` when no entry replied.
    async fn walk(&self, cx: &Context) -> Option<Result<Reply, Failure>> {
        let method = cx.request.method();
        for entry in self.routes.matching(method, &cx.pathname) {
            tracing::trace!(route = %entry.label(), "Invoking handler");
            let result = AssertUnwindSafe((entry.handler())(cx.clone()))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(Some(reply))) => return Some(Ok(reply)),
                Ok(Ok(None)) => continue,
                Ok(Err(failure)) => return Some(Err(failure)),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(route = %entry.label(), panic = %message, "Handler panicked");
                    return Some(Err(Failure::opaque(HandlerPanic(message))));
                }
            }
        }
        None
    }

    fn translate(&self, failure: &Failure) -> Result<Reply, DispatchAbort> {
        let reply = std::panic::catch_unwind(AssertUnwindSafe(|| self.translator.translate(failure)))
            .map_err(|panic| {
                tracing::error!(
                    panic = %panic_message(panic.as_ref()),
                    failure = %failure,
                    "Error translator panicked"
                );
                DispatchAbort
            })?;

        self.diagnostics.emit(&Diagnostic::ClientRequestFailed {
            status_code: reply.status.as_u16(),
            response: reply.body.to_json(),
            stack: failure.detail(),
        });
        Ok(reply)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("base_url", &self.base_url.as_str())
            .field("translator", &self.translator)
            .finish()
    }
}

/// Tower adapter handing requests from the connection stack to a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchService {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl<B> Service<axum::http::Request<B>> for DispatchService
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = DispatchAbort;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: axum::http::Request<B>) -> Self::Future {
        let dispatcher = Arc::clone(&self.dispatcher);
        let request = request.map(Body::new);
        Box::pin(async move { dispatcher.dispatch(request).await })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! HTTP server: listener lifecycle and per-connection serving.
//!
//! # Responsibilities
//! - Bind the configured address and record the actual bound port
//! - Serve each accepted connection over HTTP/1.1 or HTTP/2
//! - Wire up the per-request tower stack (request ID, tracing)
//! - Stop accepting, drain open connections, and release the port on `stop()`
//!
//! # Design Decisions
//! - The route table is frozen before the server exists; no mutation after start
//! - One task per connection; the connection limit is a semaphore permit
//! - Draining asks hyper for a graceful shutdown, which lets in-flight
//!   requests finish and closes idle keep-alive connections immediately

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::dispatcher::{DispatchService, Dispatcher};
use crate::http::error::BoxError;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::routing::RouteTable;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
    #[error("shutdown timed out with {remaining} connection(s) still open")]
    DrainTimeout { remaining: u64 },
    #[error("listener failed: {0}")]
    Close(#[source] BoxError),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_loop: JoinHandle<Result<(), ListenerError>>,
}

/// Binds one TCP port and serves the dispatcher on it.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig, routes: RouteTable) -> Result<Self, ServerError> {
        let dispatcher = Dispatcher::from_config(&config, routes)?;
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Use a dispatcher configured with custom translator rules or diagnostics.
    pub fn with_dispatcher(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            running: None,
        }
    }

    /// Bind and start accepting. Resolves once the port is bound.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = Listener::bind(&self.config.listener).await?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            connection_builder(self.config.listener.keep_alive_timeout()),
            Arc::clone(&self.dispatcher),
            tracker.clone(),
            shutdown.subscribe(),
        ));

        tracing::info!(
            address = %local_addr,
            routes = self.dispatcher.routes().len(),
            "HTTP server started"
        );

        self.running = Some(Running {
            local_addr,
            shutdown,
            tracker,
            accept_loop,
        });
        Ok(local_addr)
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Open connections while running.
    pub fn open_connections(&self) -> u64 {
        self.running
            .as_ref()
            .map_or(0, |running| running.tracker.active_count())
    }

    /// Stop accepting, drain every open connection, and close the socket.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;
        tracing::info!(
            address = %running.local_addr,
            open_connections = running.tracker.active_count(),
            "Stopping HTTP server"
        );

        running.shutdown.trigger();
        let accept_result = running.accept_loop.await;

        running.tracker.begin_drain();
        let timeout = self.config.listener.shutdown_timeout();
        if tokio::time::timeout(timeout, running.tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            let remaining = running.tracker.active_count();
            tracing::warn!(remaining, "Connections still open after shutdown timeout");
            return Err(ServerError::DrainTimeout { remaining });
        }

        match accept_result {
            Ok(Ok(())) => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Close(Box::new(e))),
            Err(e) => Err(ServerError::Close(Box::new(e))),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            tracing::debug!(address = %running.local_addr, "Server dropped while running");
            running.shutdown.trigger();
            running.tracker.begin_drain();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

fn connection_builder(keep_alive: Duration) -> auto::Builder<TokioExecutor> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .keep_alive(true)
        .header_read_timeout(keep_alive);
    builder
}

async fn accept_loop(
    listener: Listener,
    builder: auto::Builder<TokioExecutor>,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ListenerError> {
    loop {
        let (stream, peer_addr, permit) = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
                Err(e) => return Err(e),
            },
        };

        let guard = tracker.track();
        tokio::spawn(serve_connection(
            stream,
            peer_addr,
            permit,
            guard,
            builder.clone(),
            Arc::clone(&dispatcher),
            tracker.drain_receiver(),
        ));
    }

    listener.close();
    tracing::debug!("Accept loop stopped");
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    builder: auto::Builder<TokioExecutor>,
    dispatcher: Arc<Dispatcher>,
    mut drain: watch::Receiver<bool>,
) {
    let service = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .service(DispatchService::new(dispatcher));

    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain_requested(&mut drain) => {
            tracing::debug!(connection_id = %guard.id(), "Draining connection");
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %guard.id(),
            peer_addr = %peer_addr,
            error = %e,
            "Connection ended with error"
        );
    }
}

async fn drain_requested(drain: &mut watch::Receiver<bool>) {
    // A closed channel also means the server is gone.
    let _ = drain.wait_for(|draining| *draining).await;
}

fn request_span(request: &axum::http::Request<Incoming>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;

    fn config() -> ServerConfig {
        ServerConfig {
            listener: ListenerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                shutdown_timeout_secs: 2,
                ..ListenerConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_resolves_port_zero() {
        let mut server = Server::new(config(), RouteTable::default()).unwrap();
        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        server.stop().await.unwrap();
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn starting_twice_fails() {
        let mut server = Server::new(config(), RouteTable::default()).unwrap();
        server.start().await.unwrap();
        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_fails() {
        let mut server = Server::new(config(), RouteTable::default()).unwrap();
        assert!(matches!(server.stop().await, Err(ServerError::NotRunning)));
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let mut server = Server::new(config(), RouteTable::default()).unwrap();
        let addr = server.start().await.unwrap();
        server.stop().await.unwrap();
        assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        let mut config = config();
        config.listener.base_url = "not a url".to_string();
        assert!(matches!(
            Server::new(config, RouteTable::default()),
            Err(ServerError::BaseUrl(_))
        ));
    }
}

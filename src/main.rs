//! upload-dispatch server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server ──▶ http::dispatcher
//!                                                            │
//!                                       route walk (registration order)
//!                                                            │
//!                          ┌─────────────────┬───────────────┴──────────┐
//!                          ▼                 ▼                          ▼
//!                     middleware        body reader            multipart classifier
//!                     (pass/fail)       (size-bounded)         (sample + sniff + stream)
//!                          │                 │                          │
//!                          └────────┬────────┴──────────────────────────┘
//!                                   ▼
//!     Client Response ◀──── reply or translated failure (+ diagnostics)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header, StatusCode};
use clap::Parser;
use serde_json::json;

use upload_dispatch::body::{read_body, BodyKind, Payload};
use upload_dispatch::config::{self, FileSizeLimit, ServerConfig};
use upload_dispatch::http::{Context, Dispatcher, ErrorTranslator, Failure, Reply, Server};
use upload_dispatch::lifecycle::shutdown_signal;
use upload_dispatch::multipart::{parse_multipart, MultipartError, ParsedMultipart};
use upload_dispatch::observability::{logging, metrics};
use upload_dispatch::routing::{HandlerResult, RouteError, RouteTable};

#[derive(Parser, Debug)]
#[command(name = "upload-dispatch")]
#[command(about = "Ordered request dispatch with streaming upload classification", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the port of the configured bind address.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Bearer token required for /admin routes. Admin routes always answer 401 without it.
    #[arg(long)]
    admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };
    apply_overrides(&mut config, &cli)?;

    logging::init_logging(&config.observability);
    tracing::info!("upload-dispatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_url = %config.listener.base_url,
        max_body_bytes = config.limits.max_body_bytes,
        max_file_megabytes = config.upload.max_file_megabytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let routes = demo_routes(&config, cli.admin_token.map(Arc::from))?;
    let dispatcher = Dispatcher::from_config(&config, routes)?.with_translator(translator());
    let mut server = Server::with_dispatcher(config, dispatcher);

    let addr = server.start().await?;
    tracing::info!(address = %addr, "Listening for connections");

    shutdown_signal().await;
    server.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut ServerConfig, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = cli.port {
        let mut addr: std::net::SocketAddr = config.listener.bind_address.parse()?;
        addr.set_port(port);
        config.listener.bind_address = addr.to_string();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    config::validate_config(config).map_err(config::ConfigError::Validation)?;
    Ok(())
}

fn demo_routes(config: &ServerConfig, admin_token: Option<Arc<str>>) -> Result<RouteTable, RouteError> {
    let max_body_bytes = config.limits.max_body_bytes;
    let file_limit = config.upload.file_size_limit();

    let routes = RouteTable::builder()
        .get("/health", |_cx| async { Ok(Some(Reply::json(json!({ "status": "ok" })))) })
        .redirect("/healthz", "/health", None)?
        .middleware_at(regex_prefix("/admin"), move |cx| {
            require_bearer(cx, admin_token.clone())
        })
        .get("/admin/limits", move |_cx| async move {
            Ok(Some(Reply::json(json!({
                "maxBodyBytes": max_body_bytes,
                "maxFileBytes": file_limit.max_bytes,
            }))))
        })
        .post("/upload", move |cx| upload(cx, file_limit))
        .post("/echo", move |cx| echo(cx, max_body_bytes))
        .build();
    Ok(routes)
}

fn regex_prefix(prefix: &str) -> regex::Regex {
    regex::Regex::new(&format!("^{}(/|$)", regex::escape(prefix)))
        .expect("escaped prefix is a valid pattern")
}

async fn require_bearer(cx: Context, token: Option<Arc<str>>) -> HandlerResult {
    let presented = cx
        .request
        .header(header::AUTHORIZATION)
        .and_then(|value| value.strip_prefix("Bearer "));
    match (token, presented) {
        (Some(expected), Some(presented)) if *expected == *presented => Ok(None),
        _ => Err(Failure::http(StatusCode::UNAUTHORIZED, "missing or invalid bearer token")),
    }
}

async fn upload(cx: Context, limit: FileSizeLimit) -> HandlerResult {
    let ParsedMultipart {
        file_stream,
        file_type_candidates,
        original_file_name,
        field_name,
        declared_mime,
        operation_name,
        variables,
        ..
    } = parse_multipart(&cx.request, &limit).await?;

    let contents = file_stream.collect_bytes().await?;
    let candidates = serde_json::to_value(file_type_candidates.as_slice()).map_err(Failure::opaque)?;

    Ok(Some(Reply::json(json!({
        "fileName": original_file_name,
        "fieldName": field_name,
        "declaredMime": declared_mime,
        "operationName": operation_name,
        "hasVariables": variables.is_some(),
        "size": contents.len(),
        "fileTypes": candidates,
    }))))
}

async fn echo(cx: Context, max_body_bytes: usize) -> HandlerResult {
    let reply = match read_body(&cx.request, max_body_bytes, BodyKind::Structured).await? {
        Payload::Structured(value) => Reply::json(value),
        Payload::Text(text) => Reply::text(text),
        Payload::Raw(bytes) => Reply::bytes(bytes),
    };
    Ok(Some(reply))
}

fn translator() -> ErrorTranslator {
    ErrorTranslator::new().rule_for::<MultipartError, _>(|err| {
        let (status, code) = match err {
            MultipartError::Decoder(multer::Error::FieldSizeExceeded { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "file_too_large")
            }
            e if e.is_file_rejection() => (StatusCode::BAD_REQUEST, "unsupported_file"),
            _ => (StatusCode::BAD_REQUEST, "malformed_multipart"),
        };
        Some(Reply::wire_error(status, code, &err.to_string()))
    })
}

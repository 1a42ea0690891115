//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Root configuration for the dispatch server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, base URL, keep-alive).
    pub listener: ListenerConfig,

    /// Request body limits.
    pub limits: LimitsConfig,

    /// Multipart upload settings.
    pub upload: UploadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000"). Port 0 picks a free port.
    pub bind_address: String,

    /// Base URL used to resolve relative request targets.
    pub base_url: String,

    /// How long an idle keep-alive connection may wait for its next request.
    pub keep_alive_timeout_secs: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on connection draining during `stop()`.
    pub shutdown_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4000".to_string(),
            base_url: "http://localhost".to_string(),
            keep_alive_timeout_secs: 5,
            max_connections: 10_000,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Request body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes accepted by the body reader.
    pub max_body_bytes: usize,

    /// Close the connection after a response whose request body stream was
    /// destroyed (oversized entity). When false the transport may reuse it.
    pub close_connection_on_rejected_entity: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1MB
            close_connection_on_rejected_entity: true,
        }
    }
}

/// Multipart upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file part, in megabytes.
    pub max_file_megabytes: u64,
}

impl UploadConfig {
    pub fn file_size_limit(&self) -> FileSizeLimit {
        FileSizeLimit::from_megabytes(self.max_file_megabytes)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_megabytes: 10,
        }
    }
}

/// File size limit expressed both ways, so error messages can quote megabytes
/// while the decoder enforces bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileSizeLimit {
    pub max_bytes: u64,
    pub max_megabytes: u64,
}

impl FileSizeLimit {
    pub fn from_megabytes(max_megabytes: u64) -> Self {
        Self {
            max_bytes: max_megabytes.saturating_mul(BYTES_PER_MEGABYTE),
            max_megabytes,
        }
    }
}

impl Default for FileSizeLimit {
    fn default() -> Self {
        UploadConfig::default().file_size_limit()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

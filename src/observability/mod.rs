//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and server produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → diagnostics.rs (typed `invalid-url` / `client-request-failed` events)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Any registered DiagnosticSink (tracing, channel, fan-out)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Request ID flows through every span
//! - Diagnostics are observer callbacks, not an event emitter

pub mod diagnostics;
pub mod logging;
pub mod metrics;

pub use diagnostics::{ChannelSink, Diagnostic, DiagnosticSink, FanoutSink, TracingSink};

//! Diagnostic events for external observers.
//!
//! The dispatcher reports two events: `invalid-url` when a request target
//! cannot be resolved, and `client-request-failed` when a handler fails and
//! the error translator produced the response. Observers register a
//! [`DiagnosticSink`]; event names and payload fields are a stable contract.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

/// A diagnostic event emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Diagnostic {
    InvalidUrl {
        url: String,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    ClientRequestFailed {
        status_code: u16,
        response: serde_json::Value,
        stack: String,
    },
}

impl Diagnostic {
    /// The event name observers subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            Diagnostic::InvalidUrl { .. } => "invalid-url",
            Diagnostic::ClientRequestFailed { .. } => "client-request-failed",
        }
    }
}

/// Observer for diagnostic events. Implementations must not block.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: &Diagnostic);
}

/// Default sink: logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: &Diagnostic) {
        match event {
            Diagnostic::InvalidUrl { url, error } => {
                tracing::warn!(event = event.name(), url = %url, error = %error, "Invalid request URL");
            }
            Diagnostic::ClientRequestFailed {
                status_code,
                response,
                stack,
            } => {
                if *status_code >= 500 {
                    tracing::error!(event = event.name(), status = status_code, response = %response, stack = %stack, "Client request failed");
                } else {
                    tracing::info!(event = event.name(), status = status_code, response = %response, stack = %stack, "Client request failed");
                }
            }
        }
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Diagnostic>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Diagnostic>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DiagnosticSink for ChannelSink {
    fn emit(&self, event: &Diagnostic) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}

/// Delivers each event to several sinks in registration order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DiagnosticSink for FanoutSink {
    fn emit(&self, event: &Diagnostic) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_and_payload_shape() {
        let event = Diagnostic::ClientRequestFailed {
            status_code: 401,
            response: serde_json::json!({ "error": "unauthorized" }),
            stack: "missing token".into(),
        };
        assert_eq!(event.name(), "client-request-failed");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "client-request-failed");
        assert_eq!(json["statusCode"], 401);
        assert_eq!(json["response"]["error"], "unauthorized");

        let invalid = Diagnostic::InvalidUrl {
            url: "http://[".into(),
            error: "invalid IPv6 address".into(),
        };
        assert_eq!(serde_json::to_value(&invalid).unwrap()["event"], "invalid-url");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (a, mut rx_a) = ChannelSink::new();
        let (b, mut rx_b) = ChannelSink::new();
        let fanout = FanoutSink::new().with(Arc::new(a)).with(Arc::new(b));

        fanout.emit(&Diagnostic::InvalidUrl {
            url: "x".into(),
            error: "y".into(),
        });

        assert_eq!(rx_a.try_recv().unwrap().name(), "invalid-url");
        assert_eq!(rx_b.try_recv().unwrap().name(), "invalid-url");
    }
}

//! The bounded body reader.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::body::error::BodyError;
use crate::http::error::BoxError;
use crate::http::Request;

/// How the accumulated bytes are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// JSON. An empty body decodes to an empty object.
    Structured,
    /// UTF-8 text.
    Text,
    /// Bytes verbatim.
    Raw,
}

impl BodyKind {
    fn agrees_with(&self, content_type: &str) -> bool {
        let essence = essence(content_type);
        match self {
            BodyKind::Structured => essence == "application/json" || essence.ends_with("+json"),
            BodyKind::Text => essence.starts_with("text/"),
            BodyKind::Raw => true,
        }
    }
}

/// A materialized request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(serde_json::Value),
    Text(String),
    Raw(Bytes),
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Media types this reader refuses; multipart bodies go to the classifier.
fn is_unparseable(content_type: &str) -> bool {
    essence(content_type) == "multipart/form-data"
}

/// Read and decode the request body, enforcing `max_bytes`.
///
/// On success the payload is also stored on the request, so later handlers
/// can see it through [`Request::payload`].
pub async fn read_body(
    request: &Request,
    max_bytes: usize,
    kind: BodyKind,
) -> Result<Payload, BodyError> {
    if !request.is_readable() {
        return Err(BodyError::AlreadyConsumed);
    }

    if let Some(content_type) = request.content_type() {
        if is_unparseable(content_type) {
            return Err(BodyError::UnsupportedMediaType {
                content_type: content_type.to_string(),
            });
        }
        if !kind.agrees_with(content_type) {
            tracing::debug!(
                content_type = %content_type,
                kind = ?kind,
                "Content-Type disagrees with requested body kind"
            );
        }
    }

    let body = request.take_body().ok_or(BodyError::AlreadyConsumed)?;

    if let Some(declared) = request.content_length() {
        if declared > max_bytes as u64 {
            drop(body);
            request.mark_entity_rejected();
            tracing::debug!(declared, limit = max_bytes, "Declared Content-Length over limit");
            return Err(BodyError::TooLarge { limit: max_bytes });
        }
    }

    let bytes = match read_limited(body.into_data_stream(), max_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if matches!(e, BodyError::TooLarge { .. }) {
                request.mark_entity_rejected();
            }
            return Err(e);
        }
    };

    let payload = decode(bytes, kind)?;
    request.store_payload(payload.clone());
    Ok(payload)
}

/// Accumulate a byte stream, failing as soon as it grows past `max_bytes`.
///
/// The stream is dropped on overflow without being polled again.
pub async fn read_limited<S, E>(stream: S, max_bytes: usize) -> Result<Bytes, BodyError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let mut stream = std::pin::pin!(stream);
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyError::Io(e.into()))?;
        if buf.len() + chunk.len() > max_bytes {
            tracing::debug!(
                received = buf.len() + chunk.len(),
                limit = max_bytes,
                "Body exceeded limit; aborting stream"
            );
            return Err(BodyError::TooLarge { limit: max_bytes });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

fn decode(bytes: Bytes, kind: BodyKind) -> Result<Payload, BodyError> {
    match kind {
        BodyKind::Structured if bytes.is_empty() => {
            Ok(Payload::Structured(serde_json::Value::Object(Default::default())))
        }
        BodyKind::Structured => serde_json::from_slice(&bytes)
            .map(Payload::Structured)
            .map_err(BodyError::Malformed),
        BodyKind::Text => String::from_utf8(bytes.to_vec())
            .map(Payload::Text)
            .map_err(BodyError::InvalidText),
        BodyKind::Raw => Ok(Payload::Raw(bytes)),
    }
}

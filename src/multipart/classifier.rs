//! Field/file demultiplexing and file-head sampling.
//!
//! # Responsibilities
//! - Capture `operationName`, `query` and `variables` as they arrive
//! - Enforce that `query` precedes the file part
//! - Buffer only the file head, classify it, and hand back the whole file
//!
//! # States
//! ```text
//! AwaitingFieldsOrFile → SamplingFileHead → { StreamingResumed | Rejected } → Done
//!                      ↘ Failed (decoder error, missing query, no file)
//! ```
//!
//! # Design Decisions
//! - The file part is moved into the returned stream, never copied
//! - Rejection and failure drop the file part and the decoder; nothing keeps
//!   reading the request after the parse concludes
//! - Text fields count toward the same per-part size limit as the file
//! - Sampling reads whole decoder chunks, so more than `SAMPLE_SIZE` bytes
//!   may be held at once; the per-part size limit bounds that buffer, and a
//!   violation during sampling fails the whole parse

use std::error::Error as StdError;
use std::sync::LazyLock;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use multer::{Constraints, Field, Multipart, SizeLimit};
use regex::Regex;

use crate::config::FileSizeLimit;
use crate::http::Request;
use crate::multipart::error::MultipartError;
use crate::multipart::sniff::{classify, FileTypeCandidates, SAMPLE_SIZE};
use crate::multipart::stream::{FileStream, PrefixedStream};
use crate::observability::metrics;

const FILE_FIELD: &str = "file";

/// Operation names: ASCII letters, digits, `_` and `-`.
static OPERATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("operation name pattern is valid")
});

/// A classified upload.
#[derive(Debug)]
pub struct ParsedMultipart {
    /// The full file: sampled head followed by the rest of the part.
    pub file_stream: FileStream,
    pub file_type_candidates: FileTypeCandidates,
    pub original_file_name: String,
    pub field_name: String,
    pub declared_mime: Option<String>,
    pub operation_name: Option<String>,
    pub query: String,
    pub variables: Option<String>,
}

#[derive(Debug, Default)]
struct CapturedFields {
    operation_name: Option<String>,
    query: Option<String>,
    variables: Option<String>,
}

/// Trimmed `raw` if it is a well-formed operation name.
pub fn canonical_operation_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if OPERATION_NAME.is_match(trimmed) {
        Some(trimmed.to_string())
    } else {
        if !trimmed.is_empty() {
            tracing::warn!(operation_name = %trimmed, "Ignoring malformed operation name");
        }
        None
    }
}

/// Classify the multipart body of `request`.
pub async fn parse_multipart(
    request: &Request,
    limit: &FileSizeLimit,
) -> Result<ParsedMultipart, MultipartError> {
    if !request.is_readable() {
        return Err(MultipartError::AlreadyConsumed);
    }
    let boundary = request
        .content_type()
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(MultipartError::MissingBoundary)?;
    let body = request.take_body().ok_or(MultipartError::AlreadyConsumed)?;

    parse_multipart_stream(body.into_data_stream(), boundary, limit).await
}

/// Classify a raw multipart stream with the given boundary.
pub async fn parse_multipart_stream<S, O, E>(
    stream: S,
    boundary: impl Into<String>,
    limit: &FileSizeLimit,
) -> Result<ParsedMultipart, MultipartError>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + 'static,
{
    let constraints = Constraints::new().size_limit(SizeLimit::new().per_field(limit.max_bytes));
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    let result = demultiplex(&mut multipart).await;
    match &result {
        Ok(parsed) => {
            metrics::record_upload("accepted");
            tracing::debug!(
                file_name = %parsed.original_file_name,
                file_type = parsed.file_type_candidates.primary().extension(),
                live = parsed.file_stream.is_live(),
                "Upload accepted"
            );
        }
        Err(e) if e.is_file_rejection() => {
            metrics::record_upload("rejected");
            tracing::info!(error = %e, "Upload rejected");
        }
        Err(e) => {
            metrics::record_upload("failed");
            tracing::debug!(error = %e, "Multipart parse failed");
        }
    }
    result
}

async fn demultiplex(multipart: &mut Multipart<'static>) -> Result<ParsedMultipart, MultipartError> {
    let mut fields = CapturedFields::default();

    while let Some(field) = multipart.next_field().await? {
        if is_file_part(&field) {
            let Some(query) = fields.query.take() else {
                tracing::debug!(field = ?field.name(), "File part arrived before query field");
                return Err(MultipartError::FieldsMustPrecedeFile);
            };
            return sample_file(field, fields, query).await;
        }

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("operationName") => {
                let raw = field.text().await?;
                fields.operation_name = canonical_operation_name(&raw);
            }
            Some("query") => fields.query = Some(field.text().await?),
            Some("variables") => fields.variables = Some(field.text().await?),
            other => tracing::debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    Err(MultipartError::NoFile)
}

fn is_file_part(field: &Field<'_>) -> bool {
    field.file_name().is_some() || field.name() == Some(FILE_FIELD)
}

async fn sample_file(
    mut field: Field<'static>,
    fields: CapturedFields,
    query: String,
) -> Result<ParsedMultipart, MultipartError> {
    let field_name = field.name().unwrap_or_default().to_string();
    let original_file_name = field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| field_name.clone());
    let declared_mime = field.content_type().map(|mime| mime.essence_str().to_string());

    let mut sample = BytesMut::with_capacity(SAMPLE_SIZE);
    let mut stream_ended = false;
    while sample.len() < SAMPLE_SIZE {
        match field.chunk().await? {
            Some(chunk) => sample.extend_from_slice(&chunk),
            None => {
                stream_ended = true;
                break;
            }
        }
    }
    let sample = sample.freeze();

    let file_type_candidates = classify(&sample, declared_mime.as_deref(), stream_ended)?;

    let file_stream: FileStream = if stream_ended {
        PrefixedStream::replay(sample)
    } else {
        PrefixedStream::new(sample, field.map(|chunk| chunk.map_err(MultipartError::from)).boxed())
    };

    Ok(ParsedMultipart {
        file_stream,
        file_type_candidates,
        original_file_name,
        field_name,
        declared_mime,
        operation_name: fields.operation_name,
        query,
        variables: fields.variables,
    })
}

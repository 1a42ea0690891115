//! Streaming multipart upload classification.
//!
//! # Data Flow
//! ```text
//! Request body stream
//!     → multer (boundary framing, part headers, per-part streams)
//!     → classifier.rs (capture operationName/query/variables, find the file)
//!     → sample the first SAMPLE_SIZE file bytes
//!     → sniff.rs (signature detection, text fallback)
//!     → stream.rs (sampled prefix + live remainder handed to the caller)
//! ```
//!
//! # Design Decisions
//! - Only the sample is buffered; the file itself is never materialized
//! - Text fields must precede the file part
//! - Exactly one of {file stream, rejection} per upload

pub mod classifier;
pub mod error;
pub mod sniff;
pub mod stream;

pub use classifier::{
    canonical_operation_name, parse_multipart, parse_multipart_stream, ParsedMultipart,
};
pub use error::MultipartError;
pub use sniff::{classify, detect_signature, FileType, FileTypeCandidates, SAMPLE_SIZE};
pub use stream::{FileStream, PrefixedStream};

//! Size-bounded request body reading.
//!
//! # Data Flow
//! ```text
//! Request body stream
//!     → reader.rs (readable check, media check, bounded accumulation)
//!     → decode by kind (JSON / text / raw bytes)
//!     → Payload, also stored on the Request
//! ```
//!
//! # Design Decisions
//! - The limit is enforced per chunk, never after the stream ends
//! - Exceeding the limit drops the stream, freeing the connection
//! - A request body is materialized at most once

pub mod error;
pub mod reader;

pub use error::BodyError;
pub use reader::{read_body, read_limited, BodyKind, Payload};

//! Request dispatch and streaming multipart upload classification.
//!
//! A frozen, ordered route table is walked per request; the first handler
//! that replies wins, failures are translated exactly once, and request
//! bodies are read under a size limit or streamed through the multipart
//! classifier without materializing uploaded files.

// Core subsystems
pub mod body;
pub mod config;
pub mod http;
pub mod multipart;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use body::{read_body, BodyError, BodyKind, Payload};
pub use config::ServerConfig;
pub use http::{Context, Dispatcher, ErrorTranslator, Failure, Reply, Request, Server, ServerError};
pub use lifecycle::Shutdown;
pub use multipart::{parse_multipart, FileType, MultipartError, ParsedMultipart};
pub use routing::{HandlerResult, Matcher, RouteTable, RouteTableBuilder};

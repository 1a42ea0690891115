//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper connection, request ID, tracing span)
//!     → dispatcher.rs (resolve URL, decode pathname and query)
//!     → route walk over the frozen RouteTable
//!     → error.rs (translate a failure exactly once)
//!     → response.rs (status, body, merged headers)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchAbort, DispatchService, Dispatcher};
pub use error::{BoxError, ErrorTranslator, Failure, TranslatorRule};
pub use request::{Context, Request};
pub use response::{ContentType, Reply, ReplyBody, ResponseHeaders};
pub use server::{Server, ServerError};

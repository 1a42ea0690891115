//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route registration (at startup):
//!     RouteTableBuilder::{get, post, .., middleware, redirect}
//!     → build() freezes the entries as an immutable RouteTable
//!
//! Incoming Request (method, pathname)
//!     → router.rs (walk entries in registration order)
//!     → matcher.rs (exact path or regex pattern)
//!     → dispatcher invokes each matching handler until one replies
//! ```
//!
//! # Design Decisions
//! - Linear scan, not a trie: registration order is the only tie-break
//! - Routes are immutable once built; no locking at runtime
//! - Exact matching never folds trailing slashes

pub mod matcher;
pub mod query;
pub mod router;

pub use matcher::Matcher;
pub use query::{decode_pathname, decode_query, Query, QueryValue};
pub use router::{
    into_handler, BoxHandler, HandlerEntry, HandlerResult, RouteError, RouteTable,
    RouteTableBuilder,
};

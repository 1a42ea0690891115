//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc with the server and dispatcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the server never reloads it while running
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    FileSizeLimit, LimitsConfig, ListenerConfig, ObservabilityConfig, ServerConfig, UploadConfig,
};
pub use validation::{validate_config, ValidationError};

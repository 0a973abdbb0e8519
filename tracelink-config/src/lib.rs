//! Shared configuration library for the trace-link recovery service.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables (including those loaded from `.env`). The
//! loader returns the composed [`Config`] together with non-fatal
//! [`ConfigWarnings`]; guard-rail violations are hard errors.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    Config, ConfigMetadata, CorsConfig, JobsConfig, PipelineConfig, ServerConfig, StoreConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};

//! Configuration module: YAML loading, env-backed defaults and logging
//!
//! This module provides:
//! - Configuration types (`ClientConfig`)
//! - YAML loading functionality (`load_config`)
//! - Defaults with environment variable overrides (`constants`)
//! - Logging initialization and redaction helpers (`logging`)

pub mod constants;
mod loader;
pub mod logging;
mod types;

// Re-export types
pub use types::ClientConfig;

// Re-export loader functions
pub use loader::{load_config, load_config_from_str};

// Re-export logging functions
pub use logging::{init_logging, sanitize, SanitizedValue};

//! YAML config loading
//!
//! Both entry points parse into `ClientConfig` and run `validate()` before
//! returning, so a loaded config is always safe to hand to
//! `ResilientClient::spawn`.

use std::io;
use std::path::Path;

use crate::error::AppError;

use super::types::ClientConfig;

/// Read, parse and validate the config file at `path`
///
/// ```ignore
/// let config = dashlink::config::load_config(Path::new("config.yaml"))?;
/// ```
pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            AppError::Config(format!("Configuration file not found: {}", path.display()))
        }
        _ => AppError::Io(e),
    })?;

    parse(&yaml, Some(path))
}

/// Parse and validate config held in memory
pub fn load_config_from_str(yaml: &str) -> Result<ClientConfig, AppError> {
    parse(yaml, None)
}

fn parse(yaml: &str, origin: Option<&Path>) -> Result<ClientConfig, AppError> {
    let config: ClientConfig = serde_yaml::from_str(yaml).map_err(|e| match origin {
        Some(path) => AppError::Config(format!("YAML parse error in '{}': {}", path.display(), e)),
        None => AppError::Config(format!("YAML parse error: {}", e)),
    })?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================

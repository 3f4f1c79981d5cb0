//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the wabridge base directory (~/.wabridge).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = crate::env::get_var(crate::env::vars::WABRIDGE_HOME) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".wabridge"))
}

/// Get the main config file path (~/.wabridge/wabridge.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("wabridge.json5"))
}

/// Get the default mapping database path (~/.wabridge/bridge.db).
pub fn database_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("bridge.db"))
}

/// Ensure the base directory exists.
pub fn ensure_dirs() -> Result<(), ConfigError> {
    let dir = base_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_base() {
        let base = base_dir().unwrap();
        assert!(config_file().unwrap().starts_with(&base));
        assert!(database_file().unwrap().starts_with(&base));
        assert!(config_file().unwrap().ends_with("wabridge.json5"));
    }
}

//! Local storage
//!
//! Data directory layout and the settings file.

use std::path::PathBuf;
use thiserror::Error;

pub mod settings;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access data directory: {0}")]
    DataDirError(String),
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Get the application data directory
///
/// Returns the platform-specific application data directory:
/// - Windows: `C:\Users\{user}\AppData\Roaming\Emberchat\Emberchat\data`
/// - macOS: `/Users/{user}/Library/Application Support/com.Emberchat.Emberchat`
/// - Linux: `/home/{user}/.local/share/emberchat`
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("com", "Emberchat", "Emberchat")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| StorageError::DataDirError("Could not determine data directory".to_string()))
}

/// Initialize the storage directory structure
///
/// Creates `{data_dir}/models/` for GGUF weights and writes a default
/// `{data_dir}/settings.json` on first run.
pub fn init_storage() -> Result<(), StorageError> {
    let data_dir = get_data_dir()?;

    let models_dir = data_dir.join("models");
    std::fs::create_dir_all(&models_dir)?;
    settings::ensure_settings_file()?;

    tracing::info!("Initialized storage at: {}", data_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_retrieval() {
        // Headless CI may lack a home directory; only check the name when resolvable
        if let Ok(path) = get_data_dir() {
            assert!(path.to_string_lossy().to_lowercase().contains("emberchat"));
        }
    }
}

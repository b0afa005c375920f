//! Settings storage
//!
//! Engine configuration read from `settings.json` in the data directory.
//! Sampling temperature and reply length are fixed by the generation
//! coordinator and are not configurable here.

use crate::storage::{get_data_dir, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory where `<model id>.gguf` files are stored
    pub models_directory: PathBuf,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Context window size
    pub context_size: u32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// System prompt prepended to every conversation; empty for none
    pub system_prompt: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            models_directory: get_data_dir()
                .ok()
                .map(|d| d.join("models"))
                .unwrap_or_else(|| PathBuf::from("./models")),
            gpu_layers: 99, // Offload all layers to GPU by default
            context_size: 4096,
            top_k: 40,
            top_p: 0.9,
            system_prompt: String::new(),
        }
    }
}

impl AppSettings {
    /// Brings out-of-range values back to something usable
    pub fn validate(&mut self) {
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }

        if self.context_size == 0 {
            self.context_size = 4096;
        }

        self.system_prompt = self.system_prompt.trim().to_string();
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> AppSettings {
    match get_settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    }
}

fn load_settings_from(path: &Path) -> Result<AppSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(AppSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: AppSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Writes the default settings file if none exists yet, so users have
/// something to edit
pub fn ensure_settings_file() -> Result<(), StorageError> {
    let path = get_settings_path()?;
    if path.exists() {
        return Ok(());
    }
    save_settings_to(&path, &AppSettings::default())
}

fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.top_p, 0.9);
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.context_size, 4096);
        assert!(settings.system_prompt.is_empty());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = AppSettings::default();

        settings.top_p = 2.0;
        settings.top_k = 0;
        settings.context_size = 0;
        settings.system_prompt = "  Be concise.\n".to_string();
        settings.validate();

        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.context_size, 4096);
        assert_eq!(settings.system_prompt, "Be concise.");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "gpu_layers": 0, "top_p": 3.5 }"#).unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.gpu_layers, 0);
        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.top_k, 40);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            load_settings_from(&path),
            Err(StorageError::JsonError(_))
        ));
    }

    #[test]
    fn test_settings_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.models_directory = dir.path().join("weights");
        settings.system_prompt = "You are terse.".to_string();
        save_settings_to(&path, &settings).unwrap();

        assert_eq!(load_settings_from(&path).unwrap(), settings);
    }
}

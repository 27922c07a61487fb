//! Persisted user preferences, read once per submission.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ReviewError;
use crate::review::{OutputLanguage, ProviderKind};

pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.5-pro-preview-05-06";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4o-mini";

/// User-facing configuration surface consumed by the controller. The
/// controller reads a copy at submission time; edits made while a request is
/// in flight affect only the next submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub provider: ProviderKind,
    /// Selected model per provider, kept separately so switching providers
    /// restores the previous choice.
    pub model_google: String,
    pub model_openrouter: String,
    pub output_language: OutputLanguage,
    pub streaming_enabled: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Google,
            model_google: DEFAULT_GOOGLE_MODEL.to_string(),
            model_openrouter: DEFAULT_OPENROUTER_MODEL.to_string(),
            output_language: OutputLanguage::En,
            streaming_enabled: false,
        }
    }
}

impl ReviewConfig {
    /// Model configured for the given provider.
    pub fn model_for(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Google => &self.model_google,
            ProviderKind::OpenRouter => &self.model_openrouter,
        }
    }

    /// Default location: `<config_dir>/nobicode/config.toml`.
    pub fn default_path() -> Result<PathBuf, ReviewError> {
        let base = dirs::config_dir()
            .ok_or_else(|| ReviewError::InvalidInput("no config directory available".into()))?;
        Ok(base.join("nobicode").join("config.toml"))
    }

    /// Loads the config, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring unreadable config file: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ReviewError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ReviewError::InvalidInput(err.to_string()))?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|err| ReviewError::InvalidInput(err.to_string()))?;
        std::fs::write(path, raw).map_err(|err| ReviewError::InvalidInput(err.to_string()))
    }
}

//! Settings file handling and environment lookups.

use std::fs;
use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assist::{DEFAULT_API_BASE, DEFAULT_MODEL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine a home directory")]
    NoProjectDirs,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not write settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Where exported documents go. `~` is expanded.
    pub output_dir: String,
    pub model: String,
    pub api_base: String,
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_dir: "~/Documents/Invoices".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl AppSettings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.output_dir))
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "invoice-desk", "app").ok_or(ConfigError::NoProjectDirs)
}

pub fn settings_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("settings.toml"))
}

/// Directory the company profile cache lives in.
pub fn cache_dir() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.data_dir().join("cache"))
}

/// `Ok(None)` when no settings file has been written yet.
pub fn load_settings() -> Result<Option<AppSettings>, ConfigError> {
    let path = settings_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?;
    AppSettings::from_toml(&content).map(Some)
}

pub fn save_settings(settings: &AppSettings) -> Result<PathBuf, ConfigError> {
    let path = settings_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(&path, toml_str).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// The text-generation key, `GEMINI_API_KEY` first and then `API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

use crate::{DeepDiffError, Limits};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "deepdiff.toml";

/// Application configuration persisted to `deepdiff.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Size and fuzzy-matching limits honored by the engine.
    #[serde(default)]
    pub limits: Limits,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, DeepDiffError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    let exists = path.exists();

    let mut config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| DeepDiffError::Serialization(e.to_string()))?
    } else {
        AppConfig::default()
    };

    config.portable_mode = portable;

    Ok(LoadedConfig {
        config,
        path,
        exists,
        portable,
    })
}

/// Loads the configuration, writing the defaults to disk on first run so
/// users have a file to edit.
pub fn ensure_config(prefer_portable: bool) -> Result<LoadedConfig, DeepDiffError> {
    let loaded = load_config(prefer_portable)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), DeepDiffError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| DeepDiffError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), DeepDiffError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "deepdiff", "deepdiff")
        .ok_or_else(|| DeepDiffError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}

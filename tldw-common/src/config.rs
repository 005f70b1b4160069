//! Configuration file loading and path resolution
//!
//! Settings resolve in this priority order:
//! 1. Command-line argument / environment variable (handled by each service's `clap` parser)
//! 2. TOML config file
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retry settings section (`[retry]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryToml {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

/// Contents of a service TOML file
///
/// Every key is optional; missing keys fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_concurrent_jobs: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<u64>,
    pub default_max_words: Option<usize>,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub transcription_model: Option<String>,
    pub summarization_model: Option<String>,
    pub ytdlp_path: Option<String>,
    pub audio_format: Option<String>,
    #[serde(default)]
    pub retry: RetryToml,
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Find the config file for a service
///
/// An explicit path (CLI or environment) must exist. Otherwise the user config
/// directory (`~/.config/tldw/<service>.toml` on Linux) is tried, then
/// `/etc/tldw/<service>.toml`. Returns `Ok(None)` when no file is present.
pub fn resolve_config_file(explicit: Option<&Path>, service_name: &str) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let file_name = format!("{}.toml", service_name);

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("tldw").join(&file_name)) {
        if user_config.exists() {
            return Ok(Some(user_config));
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/tldw").join(&file_name);
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

/// Load the service's TOML config, or defaults when no file exists
pub fn load_service_config(explicit: Option<&Path>, service_name: &str) -> Result<TomlConfig> {
    match resolve_config_file(explicit, service_name)? {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            tracing::debug!("No config file for {}, using defaults", service_name);
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/tldw (or /var/lib/tldw for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("tldw"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tldw"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tldw"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tldw"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tldw"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tldw"))
    } else {
        PathBuf::from("./tldw_data")
    }
}

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

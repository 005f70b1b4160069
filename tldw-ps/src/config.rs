//! Configuration resolution for tldw-ps
//!
//! Each setting resolves as: CLI argument / environment variable → TOML file →
//! compiled default. The OpenAI API key additionally accepts
//! `TLDW_OPENAI_API_KEY` and is never required at startup; a missing key only
//! fails the stages that need it.

use crate::utils::retry::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tldw_common::config::{default_data_dir, is_valid_key, TomlConfig};
use tldw_common::{Error, Result};
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5790;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;
pub const DEFAULT_MAX_WORDS: usize = 500;
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_SUMMARIZATION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";
/// Per-stage retry budget; downloads and transcription of long media run for minutes
pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 600_000;

/// Command-line arguments for tldw-ps
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tldw-ps")]
#[command(about = "Media summarization pipeline service")]
#[command(version)]
pub struct Args {
    /// Config file (default: ~/.config/tldw/tldw-ps.toml)
    #[arg(short, long, env = "TLDW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "TLDW_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TLDW_PORT")]
    pub port: Option<u16>,

    /// Maximum requests in flight
    #[arg(long, env = "TLDW_MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, env = "TLDW_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Directory for downloaded / extracted audio
    #[arg(long, env = "TLDW_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Directory for staged uploads
    #[arg(long, env = "TLDW_UPLOADS_DIR")]
    pub uploads_dir: Option<PathBuf>,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "TLDW_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<u64>,

    /// OpenAI API key
    #[arg(long, env = "TLDW_OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "TLDW_OPENAI_API_BASE")]
    pub openai_api_base: Option<String>,

    /// yt-dlp executable
    #[arg(long, env = "TLDW_YTDLP_PATH")]
    pub ytdlp_path: Option<String>,
}

/// OpenAI-compatible backend settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub transcription_model: String,
    pub summarization_model: String,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_jobs: usize,
    pub request_timeout: Duration,
    pub work_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub default_max_words: usize,
    pub retry: RetryPolicy,
    pub openai: OpenAiConfig,
    pub ytdlp_path: String,
    pub audio_format: String,
}

impl ServiceConfig {
    /// Merge CLI/ENV arguments over TOML values over defaults
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let data_dir = default_data_dir();
        let defaults = RetryPolicy::default();

        let retry = RetryPolicy {
            max_attempts: toml.retry.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: toml
                .retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: toml
                .retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            timeout: toml
                .retry
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_TIMEOUT_MS)),
        };

        let config = Self {
            host: args
                .host
                .clone()
                .or_else(|| toml.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            max_concurrent_jobs: args
                .max_concurrent_jobs
                .or(toml.max_concurrent_jobs)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            request_timeout: Duration::from_secs(
                args.request_timeout_secs
                    .or(toml.request_timeout_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            work_dir: args
                .work_dir
                .clone()
                .or_else(|| toml.work_dir.clone())
                .unwrap_or_else(|| data_dir.join("work")),
            uploads_dir: args
                .uploads_dir
                .clone()
                .or_else(|| toml.uploads_dir.clone())
                .unwrap_or_else(|| data_dir.join("uploads")),
            max_upload_bytes: args
                .max_upload_bytes
                .or(toml.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            default_max_words: toml.default_max_words.unwrap_or(DEFAULT_MAX_WORDS),
            retry,
            openai: OpenAiConfig {
                api_key: resolve_openai_api_key(args.openai_api_key.as_deref(), toml),
                api_base: args
                    .openai_api_base
                    .clone()
                    .or_else(|| toml.openai_api_base.clone())
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                transcription_model: toml
                    .transcription_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
                summarization_model: toml
                    .summarization_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUMMARIZATION_MODEL.to_string()),
            },
            ytdlp_path: args
                .ytdlp_path
                .clone()
                .or_else(|| toml.ytdlp_path.clone())
                .unwrap_or_else(|| DEFAULT_YTDLP_PATH.to_string()),
            audio_format: toml
                .audio_format
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(Error::Config(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay.as_millis(),
                self.retry.max_delay.as_millis()
            )));
        }
        if self.default_max_words == 0 {
            return Err(Error::Config(
                "default_max_words must be at least 1".to_string(),
            ));
        }
        if self.audio_format.trim().is_empty() || self.audio_format.contains(['/', '\\', '.']) {
            return Err(Error::Config(format!(
                "audio_format '{}' is not a plain extension",
                self.audio_format
            )));
        }
        Ok(())
    }
}

/// Resolve the OpenAI API key
///
/// **Priority:** CLI / ENV (`TLDW_OPENAI_API_KEY`) → TOML
fn resolve_openai_api_key(cli_or_env: Option<&str>, toml: &TomlConfig) -> Option<String> {
    let toml_key = toml.openai_api_key.as_deref().filter(|k| is_valid_key(k));

    if let Some(key) = cli_or_env.filter(|k| is_valid_key(k)) {
        if toml_key.is_some() {
            warn!("OpenAI API key found in both environment and TOML config. Using environment.");
        }
        info!("OpenAI API key loaded from environment / command line");
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("OpenAI API key loaded from TOML config");
        return Some(key.trim().to_string());
    }

    warn!(
        "OpenAI API key not configured. Transcription and summarization will fail until one of:\n\
         1. Environment: TLDW_OPENAI_API_KEY=your-key-here\n\
         2. TOML config: ~/.config/tldw/tldw-ps.toml (openai_api_key = \"your-key\")"
    );
    None
}

//! Service configuration.
//!
//! Loaded from a TOML file (default-location search) with serde defaults for
//! every field, so a missing or partial file still yields a runnable config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the upstream renderer base URL.
pub const RENDERER_URL_ENV: &str = "CLIPFORGE_RENDERER_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per job.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Jobs whose newest artifact is older than this are reaped.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// How often the reaper sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Base URL of the upstream video renderer; source videos referenced by
    /// render job id are fetched from `{base_url}/video/{id}`.
    #[serde(default = "default_renderer_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum size of a remote download, in bytes.
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: u64,
    /// Per-download timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// Wall-clock budget for a single ffmpeg invocation.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Overall budget for a full pipeline run.
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("/tmp/clipforge")
}

fn default_retention_secs() -> u64 {
    // 6 hours
    6 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_renderer_url() -> String {
    "http://localhost:8800".to_string()
}

fn default_fetch_max_bytes() -> u64 {
    // 2 GiB
    2 * 1024 * 1024 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_operation_timeout_secs() -> u64 {
    600
}

fn default_pipeline_timeout_secs() -> u64 {
    1800
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: default_renderer_url(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_fetch_max_bytes(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout_secs(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./clipforge.toml",
        "~/.config/clipforge/config.toml",
        "/etc/clipforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(RENDERER_URL_ENV) {
        if !url.is_empty() {
            config.renderer.base_url = url;
        }
    }
}

/// Validate configuration.
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }
    if config.storage.retention_secs == 0 {
        anyhow::bail!("Retention window cannot be 0");
    }
    if config.storage.sweep_interval_secs == 0 {
        anyhow::bail!("Sweep interval cannot be 0");
    }
    if config.fetch.max_bytes == 0 {
        anyhow::bail!("Fetch size limit cannot be 0");
    }
    if config.ffmpeg.operation_timeout_secs == 0 || config.ffmpeg.pipeline_timeout_secs == 0 {
        anyhow::bail!("ffmpeg timeouts cannot be 0");
    }
    Ok(())
}

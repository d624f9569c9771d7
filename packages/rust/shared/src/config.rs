//! Application configuration for kbscan.
//!
//! User config lives at `~/.kbscan/kbscan.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbScanError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbscan";

// ---------------------------------------------------------------------------
// Config structs (matching kbscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Search/progress settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// HTTP service settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for upstream calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum article detail requests in flight per search.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> u32 {
    4
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Emit a progress event every N processed articles.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_progress_interval() -> u32 {
    25
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP service binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

// ---------------------------------------------------------------------------
// Scan config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime scan configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Per-request upstream timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum concurrent article detail fetches (1 = sequential).
    pub concurrency: u32,
    /// Progress event cadence in processed articles.
    pub progress_interval: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScanConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.fetch.timeout_secs,
            concurrency: config.fetch.concurrency,
            progress_interval: config.search.progress_interval,
        }
    }
}

impl ScanConfig {
    /// Reject values that would stall or divide by zero.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(KbScanError::config("fetch.concurrency must be at least 1"));
        }
        if self.progress_interval == 0 {
            return Err(KbScanError::config(
                "search.progress_interval must be at least 1",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(KbScanError::config("fetch.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KbScanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbscan/kbscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbScanError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KbScanError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbScanError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbScanError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbScanError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

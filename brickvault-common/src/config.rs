//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `BRICKVAULT_ROOT_FOLDER` / `BRICKVAULT_ROOT` environment variables
//! 3. `root_folder` in the module TOML file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "brickvault.db";

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!(
        "BrickVault/{} (+https://github.com/brickvault/brickvault)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Compiled fallback values used when no other source provides them
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("brickvault"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\brickvault"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("brickvault"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/brickvault"))
        } else {
            dirs::data_local_dir()
                .map(|d| d.join("brickvault"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/brickvault"))
        };

        Self {
            root_folder,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

/// `[enrichment]` section: tunables for the metadata cache layer
///
/// Durations are plain integers so the file stays hand-editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Ids per orchestrator batch
    pub batch_size: usize,
    /// Pause between batches after a clean batch (parts and minifigs)
    pub standard_cooldown_ms: u64,
    /// Pause between batches for the price-only orchestrator
    pub price_cooldown_ms: u64,
    /// Pause between batches after any fetch in the batch was rate limited
    pub rate_limited_cooldown_ms: u64,
    /// Soft expiry of part metadata
    pub part_ttl_hours: i64,
    /// Soft expiry of minifig metadata
    pub minifig_ttl_hours: i64,
    /// Expiry of the live price snapshot
    pub price_ttl_hours: i64,
    /// History rows live this many times longer than the live snapshot
    pub history_ttl_multiplier: i64,
    /// Steady-state catalog requests per second
    pub catalog_requests_per_second: u32,
    /// Token bucket capacity for the catalog API
    pub catalog_burst: u32,
    /// Per-attempt HTTP timeout
    pub http_timeout_ms: u64,
    /// Retry budget for outbound HTTP calls
    pub http_retries: u32,
    /// Base delay for exponential backoff
    pub http_retry_delay_ms: u64,
    pub catalog_base_url: String,
    pub marketplace_base_url: String,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            standard_cooldown_ms: 6_000,
            price_cooldown_ms: 3_000,
            rate_limited_cooldown_ms: 120_000,
            part_ttl_hours: 24 * 30,
            minifig_ttl_hours: 24 * 30,
            price_ttl_hours: 24,
            history_ttl_multiplier: 5,
            catalog_requests_per_second: 1,
            catalog_burst: 5,
            http_timeout_ms: 8_000,
            http_retries: 3,
            http_retry_delay_ms: 1_000,
            catalog_base_url: "https://rebrickable.com/api/v3/lego".to_string(),
            marketplace_base_url: "https://www.bricklink.com".to_string(),
        }
    }
}

/// Module TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default)]
    pub rebrickable_api_key: Option<String>,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

/// Path of the per-module TOML file (`~/.config/brickvault/<module>.toml`)
pub fn module_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("brickvault").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file
///
/// Returns the parsed config or an error if the file is missing or malformed.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // File may hold an API key
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Resolves the root folder for a module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_path: module_config_path(module_name),
        }
    }

    /// Highest-priority override from the command line
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Use a specific TOML file instead of the per-user default
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Load the module TOML config, falling back to defaults
    pub fn load_config(&self) -> TomlConfig {
        let Some(path) = &self.config_path else {
            return TomlConfig::default();
        };

        if !path.exists() {
            debug!(
                module = %self.module_name,
                path = %path.display(),
                "No config file, using defaults"
            );
            return TomlConfig::default();
        }

        match load_toml_config(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(module = %self.module_name, error = %e, "Ignoring unreadable config file");
                TomlConfig::default()
            }
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        for var in ["BRICKVAULT_ROOT_FOLDER", "BRICKVAULT_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(root) = self.load_config().root_folder {
            return root;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

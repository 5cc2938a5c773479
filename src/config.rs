//! Configuration for the watch service, caches and logging.
//!
//! Layered like this, later layers winning:
//! - Default values
//! - TOML configuration file (`.figcache/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FIGCACHE_` and use double
//! underscores to separate nested levels:
//! - `FIGCACHE_WATCH__POLLING_TIMEOUT_SECS=5` sets `watch.polling_timeout_secs`
//! - `FIGCACHE_CACHE__UNAVAILABLE_GRACE_HOURS=24` sets `cache.unavailable_grace_hours`
//! - `FIGCACHE_LOGGING__DEFAULT=debug` sets `logging.default`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::watcher::{EventFilter, clamp_polling_timeout};

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".figcache";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "FIGCACHE_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory watch service settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Path cache and model cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Category tag -> file extensions, used by the default classifier
    #[serde(default = "default_categories")]
    pub categories: IndexMap<String, Vec<String>>,

    /// Logging levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Directories to watch from startup, in addition to those the path
    /// cache already knows about
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Skip entries whose name starts with `.`
    #[serde(default = "default_true")]
    pub ignore_dot_files: bool,

    /// Skip events about subdirectories
    #[serde(default = "default_true")]
    pub ignore_subdirectories: bool,

    /// Extension allow-list (case-insensitive, no leading dot). Empty = all.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// How long each poll cycle waits for OS notifications, clamped to [1, 60]
    #[serde(default = "default_polling_timeout_secs")]
    pub polling_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    /// Entries kept per most-recently-used list
    #[serde(default = "default_mru_capacity")]
    pub mru_capacity: usize,

    /// Entries kept by the render model cache
    #[serde(default = "default_model_capacity")]
    pub model_capacity: usize,

    /// How long a missing file or directory is remembered before purging
    #[serde(default = "default_grace_hours")]
    pub unavailable_grace_hours: u64,

    /// Where the path cache is persisted. Defaults to the user data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_polling_timeout_secs() -> u64 {
    2
}
fn default_mru_capacity() -> usize {
    crate::cache::DEFAULT_MRU_CAPACITY
}
fn default_model_capacity() -> usize {
    crate::model::DEFAULT_MODEL_CAPACITY
}
fn default_grace_hours() -> u64 {
    crate::cache::DEFAULT_UNAVAILABLE_GRACE.as_secs() / 3600
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_categories() -> IndexMap<String, Vec<String>> {
    let mut categories = IndexMap::new();
    categories.insert("doc".to_string(), vec!["fyp".to_string()]);
    categories.insert(
        "data".to_string(),
        vec!["csv".to_string(), "tsv".to_string(), "dat".to_string()],
    );
    categories
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            cache: CacheConfig::default(),
            categories: default_categories(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            ignore_dot_files: true,
            ignore_subdirectories: true,
            extensions: Vec::new(),
            polling_timeout_secs: default_polling_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mru_capacity: default_mru_capacity(),
            model_capacity: default_model_capacity(),
            unavailable_grace_hours: default_grace_hours(),
            cache_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    /// Watch the given directories with default filters.
    pub fn with_directories(directories: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            directories: directories.into_iter().collect(),
            ..Self::default()
        }
    }

    /// The filter the poll loop starts with.
    pub fn filter(&self) -> EventFilter {
        EventFilter::new(
            self.ignore_dot_files,
            self.ignore_subdirectories,
            &self.extensions,
        )
    }

    pub fn polling_timeout(&self) -> Duration {
        Duration::from_secs(clamp_polling_timeout(self.polling_timeout_secs))
    }
}

impl CacheConfig {
    pub fn unavailable_grace(&self) -> Duration {
        Duration::from_secs(self.unavailable_grace_hours.saturating_mul(3600))
    }

    /// Resolved location of the persisted path cache.
    pub fn cache_file_path(&self) -> PathBuf {
        self.cache_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("figcache")
                .join("paths.cache")
        })
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file (plus environment overrides)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.figcache/settings.toml` searching from the current directory up
    /// to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

//! Configuration management for asip-bridge.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (OPENASIP_MODULE_DIR, OPENASIP_MACHINE)
//! 2. Project-local config file (`./asip-bridge.toml`)
//! 3. User config file (`~/.config/asip-bridge/config.toml`)
//! 4. Built-in defaults
//!
//! The module file name is fixed. Configuration only decides which
//! directory it is looked up in; with no directory set, the platform's
//! dynamic library search path applies.
//!
//! # Config File Format
//!
//! ```toml
//! # asip-bridge.toml
//!
//! # Directory containing libopenasip.so
//! module_dir = "/opt/openasip/lib"
//!
//! # Machine description passed to initializeMachine
//! machine_path = "/home/user/machines/tta.adf"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::ffi::MODULE_NAME;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// asip-bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the extension module.
    pub module_dir: Option<String>,

    /// Default machine description path.
    pub machine_path: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_from_file(Path::new("asip-bridge.toml")) {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Path the extension module is opened from.
    pub fn module_path(&self) -> PathBuf {
        match &self.module_dir {
            Some(dir) => Path::new(dir).join(MODULE_NAME),
            None => PathBuf::from(MODULE_NAME),
        }
    }

    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.module_dir.is_some() {
            self.module_dir = other.module_dir;
        }
        if other.machine_path.is_some() {
            self.machine_path = other.machine_path;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("OPENASIP_MODULE_DIR") {
            log::info!("Using OPENASIP_MODULE_DIR from environment: {}", dir);
            self.module_dir = Some(dir);
        }
        if let Ok(path) = std::env::var("OPENASIP_MACHINE") {
            log::info!("Using OPENASIP_MACHINE from environment: {}", path);
            self.machine_path = Some(path);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("asip-bridge").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# asip-bridge configuration
# Place this file at ~/.config/asip-bridge/config.toml or ./asip-bridge.toml

# Directory containing libopenasip.so
# Leave unset to use the system library search path
module_dir = "/opt/openasip/lib"

# Machine description passed to initializeMachine (optional)
machine_path = "/home/user/machines/tta.adf"
"#
        .to_string()
    }
}

//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::bridge::BridgeConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_FILE: &str = "zbridge.toml";

/// Configuration loader
///
/// Merges, lowest priority first:
/// 1. Global config (~/.zbridge/config.toml)
/// 2. Project config (zbridge.toml)
/// 3. Environment variables (ZBRIDGE_*)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: BridgeConfig,

    /// The project file that contributed, if one was found
    pub project_file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// A loader reading the global layer from `path` instead of the home directory
    pub fn with_global_path(path: PathBuf) -> Self {
        Self {
            global_config_path: Some(path),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find zbridge.toml; a missing project
    /// or global file is not an error.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (project_file, project) = find_project_config(start_dir)?;
        let global = self.load_global_config()?;
        let config = apply_env_overrides(global.merge(project))?;

        Ok(LoadedConfig {
            config,
            project_file,
        })
    }

    /// Load configuration from a specific project file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let project = BridgeConfig::load_from_file(config_path)?;
        let global = self.load_global_config()?;
        let config = apply_env_overrides(global.merge(project))?;

        Ok(LoadedConfig {
            config,
            project_file: Some(config_path.to_path_buf()),
        })
    }

    fn load_global_config(&mut self) -> ConfigResult<BridgeConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match Self::global_config_dir() {
                Ok(dir) => {
                    let path = dir.join("config.toml");
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory: nothing to layer
                Err(ConfigError::HomeNotFound) => return Ok(BridgeConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(BridgeConfig::default());
        }
        BridgeConfig::load_from_file(&path)
    }

    /// Get the global configuration directory (~/.zbridge)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".zbridge"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn find_project_config(start_dir: &Path) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(PROJECT_FILE);
        if config_path.exists() {
            let config = BridgeConfig::load_from_file(&config_path)?;
            return Ok((Some(config_path), config));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok((None, BridgeConfig::default())),
        }
    }
}

/// Apply ZBRIDGE_* variables on top of the file layers
fn apply_env_overrides(mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
    if let Ok(backend) = env::var("ZBRIDGE_BACKEND") {
        config.set_backend(backend);
    }

    if let Ok(library) = env::var("ZBRIDGE_LIBRARY") {
        config.set_library(library);
    }

    if let Ok(io_threads) = env::var("ZBRIDGE_IO_THREADS") {
        let parsed = io_threads
            .trim()
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "ZBRIDGE_IO_THREADS".to_string(),
                reason: format!("'{}' is not an integer", io_threads),
            })?;
        config.context.get_or_insert_with(Default::default).io_threads = Some(parsed);
    }

    if let Ok(filter) = env::var("ZBRIDGE_LOG") {
        config.logging.get_or_insert_with(Default::default).filter = Some(filter);
    }

    config.validate()?;
    Ok(config)
}

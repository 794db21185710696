//! Bridge configuration (zbridge.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backends a configuration may select
pub const BACKENDS: &[&str] = &["native", "memory"];

pub const DEFAULT_BACKEND: &str = "native";
pub const DEFAULT_LIBRARY: &str = "zmq";
pub const DEFAULT_IO_THREADS: i32 = 1;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Bridge configuration from zbridge.toml or ~/.zbridge/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Which messaging library to drive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// "native" (libzmq) or "memory" (in-process)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Library name (`zmq`) or path to the shared object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,

    /// Directories searched before the platform defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// I/O threads for contexts created without an explicit count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_threads: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "zbridge=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl BridgeConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(backend) = self.transport.as_ref().and_then(|t| t.backend.as_deref()) {
            if !BACKENDS.contains(&backend) {
                return Err(ConfigError::InvalidValue {
                    field: "transport.backend".to_string(),
                    reason: format!(
                        "unknown backend '{}' (expected one of: {})",
                        backend,
                        BACKENDS.join(", ")
                    ),
                });
            }
        }

        if let Some(library) = self.transport.as_ref().and_then(|t| t.library.as_deref()) {
            if library.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "transport.library".to_string(),
                    reason: "library name cannot be empty".to_string(),
                });
            }
        }

        if let Some(io_threads) = self.context.as_ref().and_then(|c| c.io_threads) {
            if io_threads < 0 {
                return Err(ConfigError::InvalidValue {
                    field: "context.io_threads".to_string(),
                    reason: format!("must be zero or more, got {}", io_threads),
                });
            }
        }

        Ok(())
    }

    /// Layer `other` on top of `self`; set values in `other` win
    ///
    /// Search paths accumulate with `other`'s first.
    pub fn merge(mut self, other: BridgeConfig) -> BridgeConfig {
        if let Some(theirs) = other.transport {
            let ours = self.transport.get_or_insert_with(TransportConfig::default);
            if theirs.backend.is_some() {
                ours.backend = theirs.backend;
            }
            if theirs.library.is_some() {
                ours.library = theirs.library;
            }
            let mut paths = theirs.search_paths;
            paths.append(&mut ours.search_paths);
            ours.search_paths = paths;
        }
        if let Some(theirs) = other.context {
            let ours = self.context.get_or_insert_with(ContextConfig::default);
            if theirs.io_threads.is_some() {
                ours.io_threads = theirs.io_threads;
            }
        }
        if let Some(theirs) = other.logging {
            let ours = self.logging.get_or_insert_with(LoggingConfig::default);
            if theirs.filter.is_some() {
                ours.filter = theirs.filter;
            }
        }
        self
    }

    pub fn backend(&self) -> &str {
        self.transport
            .as_ref()
            .and_then(|t| t.backend.as_deref())
            .unwrap_or(DEFAULT_BACKEND)
    }

    pub fn library(&self) -> &str {
        self.transport
            .as_ref()
            .and_then(|t| t.library.as_deref())
            .unwrap_or(DEFAULT_LIBRARY)
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.transport
            .as_ref()
            .map(|t| t.search_paths.clone())
            .unwrap_or_default()
    }

    pub fn io_threads(&self) -> i32 {
        self.context
            .as_ref()
            .and_then(|c| c.io_threads)
            .unwrap_or(DEFAULT_IO_THREADS)
    }

    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Override the backend, as a CLI flag does
    pub fn set_backend(&mut self, backend: impl Into<String>) {
        self.transport
            .get_or_insert_with(TransportConfig::default)
            .backend = Some(backend.into());
    }

    /// Override the library, as a CLI flag does
    pub fn set_library(&mut self, library: impl Into<String>) {
        self.transport
            .get_or_insert_with(TransportConfig::default)
            .library = Some(library.into());
    }
}

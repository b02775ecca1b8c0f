//! Engine configuration.
//!
//! Settings are read from a TOML file; every key is optional.
//!
//! ```toml
//! marking_error_sentinel = "ERROR"
//! number_precision = 2
//! deferred_variables = ["Fcold", "k"]
//!
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! max_templates = 1024
//! ```
//!
//! # Lookup Order
//!
//! 1. The file passed with `--config`
//! 2. The file named by the `CATCALC_CONFIG` environment variable
//! 3. `~/.catcalc/config.toml`, if it exists
//! 4. Built-in defaults
//!
//! An explicitly named file (1 or 2) must exist.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::{
    CONFIG_ENV_VAR, DEFAULT_DEFERRED_VARIABLES, DEFAULT_MAX_CACHED_TEMPLATES, DEFAULT_NUMBER_PRECISION,
    MARKING_ERROR_SENTINEL, default_cache_ttl,
};
use crate::core::CatalogError;

/// Largest supported `number_precision`.
const MAX_PRECISION: u32 = 12;

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep lookups and compiled templates between items
    pub enabled: bool,
    /// Lifetime of cached lookups
    pub ttl_seconds: u64,
    /// Compiled templates kept before the template cache resets
    pub max_templates: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl().as_secs(),
            max_templates: DEFAULT_MAX_CACHED_TEMPLATES,
        }
    }
}

/// Settings of the recalculation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Marking stored when the template fails to render
    pub marking_error_sentinel: String,
    /// Decimal places kept for `number` attributes
    pub number_precision: u32,
    /// Variables only known during selection
    pub deferred_variables: Vec<String>,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            marking_error_sentinel: MARKING_ERROR_SENTINEL.to_string(),
            number_precision: DEFAULT_NUMBER_PRECISION,
            deferred_variables: DEFAULT_DEFERRED_VARIABLES.iter().map(ToString::to_string).collect(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load the configuration following the lookup order.
    ///
    /// # Errors
    ///
    /// Fails when an explicitly named file is missing, unreadable or invalid.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_value = std::env::var(CONFIG_ENV_VAR).ok();
        match Self::resolve_path(explicit, env_value.as_deref(), Self::default_path().ok())? {
            Some(path) => Self::load_from(&path).await,
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Pick the configuration file to read, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ConfigError`] when the flag or the environment
    /// variable names a file that does not exist.
    pub fn resolve_path(
        explicit: Option<&Path>,
        env_value: Option<&str>,
        default_path: Option<PathBuf>,
    ) -> Result<Option<PathBuf>> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env_value.map(str::trim).filter(|v| !v.is_empty()).map(PathBuf::from));

        if let Some(path) = named {
            if !path.exists() {
                return Err(CatalogError::ConfigError {
                    message: format!("Configuration file {} does not exist", path.display()),
                }
                .into());
            }
            return Ok(Some(path));
        }

        Ok(default_path.filter(|p| p.exists()))
    }

    /// Read and validate one configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, is not valid TOML or holds invalid
    /// values.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `~/.catcalc/config.toml`.
    ///
    /// # Errors
    ///
    /// Fails when the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?;
        Ok(home.join(".catcalc").join("config.toml"))
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ConfigError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let message = if self.number_precision > MAX_PRECISION {
            format!("number_precision must be at most {MAX_PRECISION}, got {}", self.number_precision)
        } else if self.cache.max_templates == 0 {
            "cache.max_templates must be positive".to_string()
        } else if self.marking_error_sentinel.is_empty() {
            "marking_error_sentinel cannot be empty".to_string()
        } else {
            return Ok(());
        };
        Err(CatalogError::ConfigError {
            message,
        })
    }
}

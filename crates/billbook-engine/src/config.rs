//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BILLBOOK_DB_PATH=/srv/billbook/billbook.db                         │
//! │     BILLBOOK_MAX_CONNECTIONS=8                                         │
//! │     BILLBOOK_SEQUENCE_PADDING=5                                        │
//! │     BILLBOOK_RESET_POLICY=never                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/billbook/billbook.toml (Linux)                           │
//! │     ~/Library/Application Support/com.billbook.billbook/ (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/billbook/billbook.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [numbering]
//! padding = 4
//! reset_policy = "yearly"   # yearly | never
//!
//! [numbering.prefixes]
//! invoice = "TAX-"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use billbook_core::validation::validate_prefix;
use billbook_core::{DocumentType, ResetPolicy, DEFAULT_SEQUENCE_PADDING};
use billbook_db::DbConfig;

use crate::error::{EngineError, EngineResult};

/// Longest zero-padding a sequence may request.
pub const MAX_SEQUENCE_PADDING: u32 = 12;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file; `None` uses the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Defaults applied to sequences when they are first created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingSettings {
    pub padding: u32,
    pub reset_policy: ResetPolicy,
    /// Type prefix overrides keyed by document type (`invoice = "TAX-"`).
    pub prefixes: BTreeMap<String, String>,
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            padding: DEFAULT_SEQUENCE_PADDING,
            reset_policy: ResetPolicy::Yearly,
            prefixes: BTreeMap::new(),
        }
    }
}

impl NumberingSettings {
    /// Type prefix for new sequences of `document_type`.
    pub fn prefix_for(&self, document_type: DocumentType) -> &str {
        self.prefixes
            .get(document_type.as_str())
            .map(String::as_str)
            .unwrap_or(document_type.policy().prefix)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.padding == 0 || self.padding > MAX_SEQUENCE_PADDING {
            return Err(EngineError::Config(format!(
                "numbering.padding must be between 1 and {MAX_SEQUENCE_PADDING}, got {}",
                self.padding
            )));
        }
        for (key, prefix) in &self.prefixes {
            key.parse::<DocumentType>()
                .map_err(|e| EngineError::Config(format!("numbering.prefixes.{key}: {e}")))?;
            validate_prefix(key, prefix)
                .map_err(|e| EngineError::Config(format!("numbering.prefixes.{key}: {e}")))?;
        }
        Ok(())
    }
}

// =============================================================================
// Engine Config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (billbook.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(EngineError::Config(
                "database.min_connections exceeds max_connections".into(),
            ));
        }
        self.numbering.validate()
    }

    /// Applies `BILLBOOK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("BILLBOOK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = var("BILLBOOK_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = max;
        }

        if let Some(padding) = var("BILLBOOK_SEQUENCE_PADDING").and_then(|v| v.parse().ok()) {
            debug!(padding, "Overriding sequence padding from environment");
            self.numbering.padding = padding;
        }

        if let Some(policy) = var("BILLBOOK_RESET_POLICY").and_then(|v| v.parse().ok()) {
            self.numbering.reset_policy = policy;
        }
    }

    /// Pool settings for [`billbook_db::Database::new`].
    pub fn db_config(&self) -> EngineResult<DbConfig> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => Self::default_database_path()
                .ok_or_else(|| EngineError::Config("no database path available".into()))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms)))
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "billbook", "billbook")
            .map(|dirs| dirs.config_dir().join("billbook.toml"))
    }

    fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "billbook", "billbook")
            .map(|dirs| dirs.data_dir().join("billbook.db"))
    }
}

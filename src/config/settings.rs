//! Ledger settings loaded from `ledger.toml`.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration. Amounts are cents and durations are milliseconds.

use crate::{
    cache::DEFAULT_TTL_MS,
    core::{backup::DEFAULT_MAX_BACKUPS, envelope::DEFAULT_CATEGORY_TTL_MS},
    entities::EnvelopeType,
    errors::{Error, Result},
};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Default settings file name, resolved against the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "ledger.toml";

/// Default number of items per bulk or restore batch.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 50;

/// Root of `ledger.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Database URL; `DATABASE_URL` takes precedence
    pub database_url: Option<String>,
    /// Cache lifetimes
    pub cache: CacheSettings,
    /// Auto-backup behaviour
    pub backup: BackupSettings,
    /// Items processed per batch in bulk operations and restores
    pub bulk_batch_size: usize,
    /// Envelopes created on first run
    pub envelopes: Vec<SeedEnvelope>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            cache: CacheSettings::default(),
            backup: BackupSettings::default(),
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            envelopes: Vec::new(),
        }
    }
}

/// `[cache]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of general entries
    pub default_ttl_ms: i64,
    /// Lifetime of per-category envelope lists
    pub envelope_category_ttl_ms: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            envelope_category_ttl_ms: DEFAULT_CATEGORY_TTL_MS,
        }
    }
}

/// `[backup]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Whether pre-sync snapshots are taken
    pub enabled: bool,
    /// Snapshots kept before the oldest is evicted
    pub max_backups: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

/// One `[[envelopes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedEnvelope {
    /// Envelope name, also used to detect an existing envelope
    pub name: String,
    /// Budget category
    pub category: String,
    /// Envelope kind; classified from the category when absent
    #[serde(default)]
    pub envelope_type: Option<EnvelopeType>,
    /// Savings target in cents
    #[serde(default)]
    pub target_amount: i64,
    /// Per-paycheck allocation in cents
    #[serde(default)]
    pub biweekly_allocation: i64,
    /// Monthly budget in cents
    #[serde(default)]
    pub monthly_budget: i64,
}

impl LedgerSettings {
    /// Resolves the database URL: `DATABASE_URL`, then the settings file, then
    /// the built-in default.
    #[must_use]
    pub fn resolve_database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
            .unwrap_or_else(|| super::database::DEFAULT_DATABASE_URL.to_string())
    }

    fn check(self) -> Result<Self> {
        if self.bulk_batch_size == 0 {
            return Err(Error::Config {
                message: "bulk_batch_size must be at least 1".to_string(),
            });
        }
        if self.cache.default_ttl_ms <= 0 || self.cache.envelope_category_ttl_ms <= 0 {
            return Err(Error::Config {
                message: "cache lifetimes must be positive".to_string(),
            });
        }
        Ok(self)
    }
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<LedgerSettings> {
    let settings: LedgerSettings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse ledger settings: {e}"),
    })?;
    settings.check()
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or a value
/// is out of range.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<LedgerSettings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read settings file: {e}"),
    })?;
    parse_settings(&contents)
}

/// Loads `./ledger.toml`, falling back to defaults when it does not exist.
pub fn load_default_settings() -> Result<LedgerSettings> {
    let path = Path::new(DEFAULT_SETTINGS_PATH);
    if !path.exists() {
        debug!("No {DEFAULT_SETTINGS_PATH} found, using default settings");
        return Ok(LedgerSettings::default());
    }

    let settings = load_settings(path)?;
    info!(
        seed_envelopes = settings.envelopes.len(),
        "Loaded {DEFAULT_SETTINGS_PATH}"
    );
    Ok(settings)
}

//! # Lookup Configuration
//!
//! Where every lookup source lives and how long to wait for it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_CLOUD_URL, TALLY_BACKUP_URL, TALLY_CATALOG_URLS,             │
//! │     TALLY_LOOKUP_TIMEOUT_MS, TALLY_DB_PATH                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.tally/tally.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Three Open*Facts catalogs, UPCitemdb backup, 8 s timeout           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! [cloud]
//! url = "https://cloud.example.com/v1"
//! collection = "crowdsourced_products"
//!
//! [catalogs]
//! urls = [
//!     "https://world.openfoodfacts.org",
//!     "https://world.openbeautyfacts.org",
//!     "https://world.openproductsfacts.org",
//! ]
//!
//! [backup]
//! url = "https://api.upcitemdb.com"
//!
//! [lookup]
//! timeout_ms = 8000
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! busy_timeout_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::coordinator::SearchSettings;
use crate::error::{LookupError, Result};

// =============================================================================
// Cloud Settings
// =============================================================================

/// Crowdsourced cloud store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Base URL of the document store.
    #[serde(default = "default_cloud_url")]
    pub url: String,

    /// Collection holding one document per barcode.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Initial backoff (milliseconds) between publish attempts.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Give up publishing after this many seconds.
    #[serde(default = "default_publish_deadline")]
    pub publish_deadline_secs: u64,
}

fn default_cloud_url() -> String {
    "http://localhost:8787/v1".to_string()
}

fn default_collection() -> String {
    "crowdsourced_products".to_string()
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_publish_deadline() -> u64 {
    30
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSettings {
            url: default_cloud_url(),
            collection: default_collection(),
            initial_backoff_ms: default_initial_backoff(),
            publish_deadline_secs: default_publish_deadline(),
        }
    }
}

// =============================================================================
// Catalog Settings
// =============================================================================

/// Public catalogs raced against each other. The race width is `urls.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_urls")]
    pub urls: Vec<String>,
}

fn default_catalog_urls() -> Vec<String> {
    vec![
        "https://world.openfoodfacts.org".to_string(),
        "https://world.openbeautyfacts.org".to_string(),
        "https://world.openproductsfacts.org".to_string(),
    ]
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            urls: default_catalog_urls(),
        }
    }
}

/// Backup catalog consulted when the whole race misses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default = "default_backup_url")]
    pub url: String,
}

fn default_backup_url() -> String {
    "https://api.upcitemdb.com".to_string()
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            url: default_backup_url(),
        }
    }
}

// =============================================================================
// Timing & Storage
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Per-lookup timeout. A lookup that exceeds it reports an error.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    8_000
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a write waits for another process holding the file.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

// =============================================================================
// Main Lookup Configuration
// =============================================================================

/// Complete lookup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub catalogs: CatalogSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub lookup: TimingSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl LookupConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading lookup config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load lookup config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        require_http_url("cloud.url", &self.cloud.url)?;
        require_http_url("backup.url", &self.backup.url)?;

        for url in &self.catalogs.urls {
            require_http_url("catalogs.urls", url)?;
        }

        if self.cloud.collection.trim().is_empty() {
            return Err(LookupError::InvalidConfig(
                "cloud.collection must not be empty".into(),
            ));
        }

        if self.lookup.timeout_ms == 0 {
            return Err(LookupError::InvalidConfig(
                "lookup.timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TALLY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("TALLY_CLOUD_URL") {
            debug!(url = %url, "Overriding cloud URL from environment");
            self.cloud.url = url;
        }

        if let Some(url) = var("TALLY_BACKUP_URL") {
            debug!(url = %url, "Overriding backup URL from environment");
            self.backup.url = url;
        }

        if let Some(urls) = var("TALLY_CATALOG_URLS") {
            self.catalogs.urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            debug!(count = self.catalogs.urls.len(), "Overriding catalogs from environment");
        }

        if let Some(timeout) = var("TALLY_LOOKUP_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.lookup.timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring non-numeric TALLY_LOOKUP_TIMEOUT_MS"),
            }
        }

        if let Some(path) = var("TALLY_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Per-lookup timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.lookup.timeout_ms)
    }

    /// Coordinator settings derived from this config.
    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            lookup_timeout: self.timeout(),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// SQLite path: configured, else `<data dir>/tally.db`, else `./tally.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "tally", "tally")
                .map(|dirs| dirs.data_dir().join("tally.db"))
                .unwrap_or_else(|| PathBuf::from("tally.db"))
        })
    }
}

fn require_http_url(field: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| LookupError::InvalidUrl(format!("{}: {}", field, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(LookupError::InvalidUrl(format!(
            "{} must use http or https, got: {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overridden(vars: &[(&str, &str)]) -> LookupConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = LookupConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_default_config() {
        let config = LookupConfig::default();
        assert_eq!(config.catalogs.urls.len(), 3);
        assert_eq!(config.cloud.collection, "crowdsourced_products");
        assert_eq!(config.timeout(), Duration::from_secs(8));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LookupConfig::default();

        config.backup.url = "ftp://upc.example.com".to_string();
        assert!(matches!(config.validate(), Err(LookupError::InvalidUrl(_))));

        config.backup.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config = LookupConfig::default();
        config.lookup.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(LookupError::InvalidConfig(_))));

        config = LookupConfig::default();
        config.catalogs.urls.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = overridden(&[
            ("TALLY_CLOUD_URL", "https://cloud.test"),
            ("TALLY_CATALOG_URLS", "https://a.test, https://b.test,,"),
            ("TALLY_LOOKUP_TIMEOUT_MS", "250"),
            ("TALLY_DB_PATH", "/tmp/tally-test.db"),
        ]);

        assert_eq!(config.cloud.url, "https://cloud.test");
        assert_eq!(config.catalogs.urls, vec!["https://a.test", "https://b.test"]);
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/tally-test.db"));
        assert_eq!(config.backup.url, default_backup_url());
    }

    #[test]
    fn test_bad_timeout_override_is_ignored() {
        let config = overridden(&[("TALLY_LOOKUP_TIMEOUT_MS", "soon")]);
        assert_eq!(config.lookup.timeout_ms, 8_000);
    }

    #[test]
    fn test_partial_toml() {
        let config: LookupConfig = toml::from_str(
            r#"
            [lookup]
            timeout_ms = 1500

            [catalogs]
            urls = ["https://only.test"]
            "#,
        )
        .unwrap();

        assert_eq!(config.lookup.timeout_ms, 1500);
        assert_eq!(config.catalogs.urls.len(), 1);
        assert_eq!(config.backup.url, default_backup_url());
        assert_eq!(config.search_settings().lookup_timeout, Duration::from_millis(1500));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use ledgerlink_aggregator::{Credentials, Environment, DEFAULT_PAGE_SIZE};
use ledgerlink_link::LinkSettings;
use ledgerlink_mirror::{MirrorTables, DEFAULT_API_URL};
use ledgerlink_reconcile::DatePolicy;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

/// Countries and languages the link widget can be localized to.
pub const SUPPORTED_COUNTRIES: &[&str] = &["US", "CA", "GB", "IE", "ES", "FR", "NL"];
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr", "es", "nl"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("{0} is not set; add it to config.toml or the environment")]
    Missing(&'static str),
    #[error("Cannot determine a data directory; pass --data-dir")]
    NoDataDir,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aggregator: AggregatorConfig,
    pub link: LinkConfig,
    pub mirror: MirrorConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub client_id: Option<String>,
    pub secret: Option<String>,
    pub environment: Environment,
    pub language: String,
    pub countries: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            client_id: None,
            secret: None,
            environment: Environment::Sandbox,
            language: "en".to_string(),
            countries: vec!["US".to_string()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: u16,
    pub timeout_secs: u64,
    pub open_browser: bool,
    pub client_name: String,
    pub user_ref: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            port: 9090,
            timeout_secs: 300,
            open_browser: true,
            client_name: "ledgerlink".to_string(),
            user_ref: "ledgerlink-user".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub api_key: Option<String>,
    pub base_id: Option<String>,
    pub api_url: String,
    pub transactions_table: String,
    pub accounts_table: String,
    pub timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let tables = MirrorTables::default();
        MirrorConfig {
            api_key: None,
            base_id: None,
            api_url: DEFAULT_API_URL.to_string(),
            transactions_table: tables.transactions,
            accounts_table: tables.accounts,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Item ids or aliases never fetched during a sync (sandbox items, say).
    pub skip_items: Vec<String>,
    pub start_date: Option<NaiveDate>,
    /// Per-alias history start, for institutions that keep more history.
    pub start_dates: BTreeMap<String, NaiveDate>,
    pub strict_dates: bool,
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            skip_items: Vec::new(),
            start_date: None,
            start_dates: BTreeMap::new(),
            strict_dates: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// `--data-dir` (or `LEDGERLINK_DATA_DIR`, via clap) when given, else the
/// platform data directory.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    directories::ProjectDirs::from("com", "ledgerlink", "ledgerlink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}

impl Config {
    /// Reads `<data_dir>/config.toml` if present, applies `LEDGERLINK_*`
    /// environment overrides and validates the result.
    pub fn load(data_dir: &Path) -> Result<Config, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => Config::parse(&text, &path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn parse(text: &str, path: &Path) -> Result<Config, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("LEDGERLINK_CLIENT_ID") {
            self.aggregator.client_id = Some(v);
        }
        if let Some(v) = var("LEDGERLINK_SECRET") {
            self.aggregator.secret = Some(v);
        }
        if let Some(v) = var("LEDGERLINK_ENVIRONMENT") {
            self.aggregator.environment = v.parse().map_err(|message| ConfigError::Invalid {
                key: "LEDGERLINK_ENVIRONMENT",
                message,
            })?;
        }
        if let Some(v) = var("LEDGERLINK_LANGUAGE") {
            self.aggregator.language = v.trim().to_string();
        }
        if let Some(v) = var("LEDGERLINK_COUNTRIES") {
            self.aggregator.countries = v
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(v) = var("LEDGERLINK_LINK_PORT") {
            self.link.port = v.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "LEDGERLINK_LINK_PORT",
                message: format!("{e}"),
            })?;
        }
        if let Some(v) = var("LEDGERLINK_MIRROR_KEY") {
            self.mirror.api_key = Some(v);
        }
        if let Some(v) = var("LEDGERLINK_MIRROR_BASE") {
            self.mirror.base_id = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .aggregator
            .countries
            .iter()
            .find(|c| !SUPPORTED_COUNTRIES.contains(&c.as_str()))
        {
            return Err(ConfigError::Invalid {
                key: "aggregator.countries",
                message: format!("unsupported country `{bad}`, expected one of {SUPPORTED_COUNTRIES:?}"),
            });
        }
        if self.aggregator.countries.is_empty() {
            return Err(ConfigError::Invalid {
                key: "aggregator.countries",
                message: "at least one country is required".to_string(),
            });
        }
        if !SUPPORTED_LANGUAGES.contains(&self.aggregator.language.as_str()) {
            return Err(ConfigError::Invalid {
                key: "aggregator.language",
                message: format!(
                    "unsupported language `{}`, expected one of {SUPPORTED_LANGUAGES:?}",
                    self.aggregator.language
                ),
            });
        }
        if self.sync.page_size == 0 || self.sync.page_size > 500 {
            return Err(ConfigError::Invalid {
                key: "sync.page_size",
                message: format!("{} is outside 1..=500", self.sync.page_size),
            });
        }
        Ok(())
    }

    /// API credentials; only commands that talk to the aggregator need them.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let client_id = self
            .aggregator
            .client_id
            .clone()
            .ok_or(ConfigError::Missing("LEDGERLINK_CLIENT_ID"))?;
        let secret = self
            .aggregator
            .secret
            .clone()
            .ok_or(ConfigError::Missing("LEDGERLINK_SECRET"))?;
        Ok(Credentials { client_id, secret })
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            client_name: self.link.client_name.clone(),
            user_ref: self.link.user_ref.clone(),
            country_codes: self.aggregator.countries.clone(),
            language: self.aggregator.language.clone(),
            days_requested: LinkSettings::default().days_requested,
            timeout: Duration::from_secs(self.link.timeout_secs),
            open_browser: self.link.open_browser,
        }
    }

    pub fn mirror_tables(&self) -> MirrorTables {
        MirrorTables {
            transactions: self.mirror.transactions_table.clone(),
            accounts: self.mirror.accounts_table.clone(),
        }
    }

    pub fn date_policy(&self) -> DatePolicy {
        DatePolicy::from_strict(self.sync.strict_dates)
    }

    /// First day of history to fetch for `label` (an alias or item id).
    pub fn start_date_for(&self, label: &str) -> Option<NaiveDate> {
        self.sync.start_dates.get(label).copied().or(self.sync.start_date)
    }

    pub fn is_skipped(&self, item_id: &str, alias: Option<&str>) -> bool {
        self.sync
            .skip_items
            .iter()
            .any(|s| s == item_id || Some(s.as_str()) == alias)
    }
}

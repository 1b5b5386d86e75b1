use crate::core::ticker::TickerSymbol;
use crate::core::valuation::UndervaluedRule;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "valscreen", "valscreen")
        .context("Could not determine project directories")
}

fn default_watchlist() -> Vec<TickerSymbol> {
    [
        "AALI.JK", "ADRO.JK", "ASII.JK", "BBCA.JK", "BBRI.JK", "BJTM.JK", "BMRI.JK", "BSDE.JK",
        "PTBA.JK", "SIDO.JK", "TLKM.JK", "UNVR.JK",
    ]
    .iter()
    .filter_map(|s| TickerSymbol::parse(s).ok())
    .collect()
}

fn default_selection() -> Vec<TickerSymbol> {
    ["BBRI.JK", "BBCA.JK"]
        .iter()
        .filter_map(|s| TickerSymbol::parse(s).ok())
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct YahooProviderConfig {
    pub base_url: String,
    pub search_base_url: String,
    /// Visited once per session to obtain the cookie that goes with the crumb.
    pub cookie_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            search_base_url: "https://query2.finance.yahoo.com".to_string(),
            cookie_url: "https://fc.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub yahoo: YahooProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub snapshot_ttl_secs: u64,
    pub search_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            snapshot_ttl_secs: 60 * 60,
            search_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub retries: usize,
    pub retry_delay_ms: u64,
    /// Yahoo chart range for price history, e.g. `6mo` or `1y`.
    pub history_range: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 15,
            concurrency: 4,
            retries: 2,
            retry_delay_ms: 500,
            history_range: "6mo".to_string(),
        }
    }
}

impl FetchConfig {
    /// Per-request HTTP timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Time allowed for one ticker: every retry attempt may run to the request
    /// timeout, with the retry delay between attempts.
    pub fn ticker_timeout(&self) -> Duration {
        let attempts = self.retries.saturating_add(1) as u32;
        let delays = Duration::from_millis(self.retry_delay_ms).saturating_mul(self.retries as u32);
        self.timeout().saturating_mul(attempts).saturating_add(delays)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ValuationConfig {
    pub undervalued_rule: UndervaluedRule,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Tickers offered for selection.
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<TickerSymbol>,
    /// Selection used until one is saved.
    #[serde(default = "default_selection")]
    pub default_selection: Vec<TickerSymbol>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub valuation: ValuationConfig,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            watchlist: default_watchlist(),
            default_selection: default_selection(),
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            valuation: ValuationConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults if there is none.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

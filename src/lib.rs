pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::screen::ScreenArgs;
use crate::cli::selection::SelectionAction;
use crate::core::config::AppConfig;
use crate::core::session::Session;
use crate::core::{AggregateOptions, SearchCandidate, Snapshot, TickerSymbol};
use crate::providers::{
    CachingSearchProvider, CachingSnapshotProvider, YahooSearchProvider, YahooSnapshotProvider,
};
use crate::store::memory::MemoryCache;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Screen(ScreenArgs),
    Watch { args: ScreenArgs, interval: Duration },
    Search { query: String },
    Selection(SelectionAction),
}

/// Providers, caches and the saved session, built once per run.
pub struct App {
    pub config: AppConfig,
    pub snapshots: CachingSnapshotProvider<YahooSnapshotProvider>,
    pub search: CachingSearchProvider<YahooSearchProvider>,
    pub session: Session,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let yahoo = &config.providers.yahoo;

        let snapshot_cache = Arc::new(MemoryCache::<TickerSymbol, Snapshot>::new());
        let snapshots = CachingSnapshotProvider::new(
            YahooSnapshotProvider::new(&yahoo.base_url, &config.fetch)?
                .with_cookie_url(&yahoo.cookie_url),
            snapshot_cache,
            config.cache.snapshot_ttl(),
        );

        let search_cache = Arc::new(MemoryCache::<String, Vec<SearchCandidate>>::new());
        let search = CachingSearchProvider::new(
            YahooSearchProvider::new(&yahoo.search_base_url, &config.fetch)?,
            search_cache,
            config.cache.search_ttl(),
        );

        let data_path = config.default_data_path().ok();
        let session = Session::new(store::open_session_collection(data_path.as_deref()));

        Ok(App {
            config,
            snapshots,
            search,
            session,
        })
    }

    pub fn aggregate_options(&self, refresh: bool) -> AggregateOptions {
        AggregateOptions {
            rule: self.config.valuation.undervalued_rule,
            concurrency: self.config.fetch.concurrency,
            timeout: self.config.fetch.ticker_timeout(),
            refresh,
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("valscreen starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::new(config)?;
    match command {
        AppCommand::Screen(args) => cli::screen::run(&app, &args).await,
        AppCommand::Watch { args, interval } => cli::screen::watch(&app, &args, interval).await,
        AppCommand::Search { query } => cli::search::run(&app.search, &query).await,
        AppCommand::Selection(action) => {
            cli::selection::run(&app.session, &app.config, &action).await
        }
    }
}

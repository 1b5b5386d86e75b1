//! Drives snapshot fetching and valuation across a ticker set.

use crate::core::snapshot::{FetchError, PricePoint, Snapshot, SnapshotProvider};
use crate::core::ticker::{TickerSet, TickerSymbol};
use crate::core::valuation::{self, Recommendation, UndervaluedRule};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, warn};

/// One screened ticker, flattened for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub ticker: TickerSymbol,
    pub short_name: Option<String>,
    pub currency: Option<String>,
    pub price: Option<Decimal>,
    pub eps: Decimal,
    pub per: Option<Decimal>,
    pub pbv: Option<Decimal>,
    pub roe_percent: Option<Decimal>,
    pub fair_value: Option<Decimal>,
    pub undervalued: bool,
    pub recommendation: Recommendation,
    pub history: Vec<PricePoint>,
}

impl ResultRow {
    pub fn new(ticker: TickerSymbol, snapshot: Snapshot, rule: UndervaluedRule) -> Self {
        let valuation = valuation::evaluate(&snapshot, rule);
        Self {
            ticker,
            short_name: snapshot.short_name,
            currency: snapshot.currency,
            price: snapshot.price,
            eps: snapshot.eps,
            per: valuation.per,
            pbv: snapshot.pbv,
            roe_percent: snapshot.roe_percent,
            fair_value: valuation.fair_value,
            undervalued: valuation.undervalued,
            recommendation: valuation.recommendation,
            history: snapshot.history,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub rule: UndervaluedRule,
    pub concurrency: usize,
    pub timeout: Duration,
    /// Bypass memoized snapshots for this pass.
    pub refresh: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            rule: UndervaluedRule::default(),
            concurrency: 4,
            timeout: Duration::from_secs(15),
            refresh: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Aggregation {
    /// Successfully valued tickers, ordered by ticker.
    pub rows: Vec<ResultRow>,
    /// Tickers that could not be fetched, ordered by ticker.
    pub failures: Vec<FetchError>,
}

impl Aggregation {
    /// Rows flagged undervalued, in the same order as `rows`.
    pub fn undervalued(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|row| row.undervalued)
    }
}

/// Fetches and values every ticker. A failing ticker is reported in
/// `failures` and never aborts the batch.
pub async fn aggregate<I>(
    tickers: I,
    provider: &dyn SnapshotProvider,
    options: &AggregateOptions,
    on_progress: &(dyn Fn() + Send + Sync),
) -> Aggregation
where
    I: IntoIterator<Item = TickerSymbol>,
{
    let unique: TickerSet = tickers.into_iter().collect();
    debug!(count = unique.len(), refresh = options.refresh, "Aggregating tickers");

    let mut results: Vec<(TickerSymbol, Result<Snapshot, FetchError>)> = stream::iter(unique)
        .map(|ticker| async move {
            let result = fetch_with_timeout(provider, &ticker, options).await;
            on_progress();
            (ticker, result)
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;
    results.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut aggregation = Aggregation::default();
    for (ticker, result) in results {
        match result {
            Ok(snapshot) => aggregation
                .rows
                .push(ResultRow::new(ticker, snapshot, options.rule)),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Skipping ticker");
                aggregation.failures.push(e);
            }
        }
    }

    aggregation
}

async fn fetch_with_timeout(
    provider: &dyn SnapshotProvider,
    ticker: &TickerSymbol,
    options: &AggregateOptions,
) -> Result<Snapshot, FetchError> {
    let fetch = async {
        if options.refresh {
            provider.refresh_snapshot(ticker).await
        } else {
            provider.fetch_snapshot(ticker).await
        }
    };

    tokio::time::timeout(options.timeout, fetch)
        .await
        .unwrap_or_else(|_| {
            Err(FetchError::unavailable(
                ticker,
                format!("timed out after {:?}", options.timeout),
            ))
        })
}

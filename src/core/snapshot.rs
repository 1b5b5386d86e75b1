//! Market snapshot types and the fetcher abstraction

use crate::core::ticker::TickerSymbol;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// Per-ticker financial data as reported by a market-data provider.
///
/// Optional fields are `None` when the provider did not report them. `eps`
/// defaults to zero when absent since the valuation treats "no earnings" and
/// "zero earnings" the same way.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub price: Option<Decimal>,
    pub eps: Decimal,
    pub pbv: Option<Decimal>,
    pub roe_percent: Option<Decimal>,
    pub history: Vec<PricePoint>,
    pub short_name: Option<String>,
    pub currency: Option<String>,
}

impl Snapshot {
    /// A snapshot without a price and without any history cannot be valued or charted.
    pub fn is_processable(&self) -> bool {
        self.price.is_some() || !self.history.is_empty()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.history.last().map(|p| p.close)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Provider unavailable for {ticker}: {cause}")]
    ProviderUnavailable { ticker: TickerSymbol, cause: String },
    #[error("Malformed response for {ticker}: {cause}")]
    MalformedResponse { ticker: TickerSymbol, cause: String },
    #[error("Unprocessable snapshot for {ticker}: no price and no price history")]
    UnprocessableSnapshot { ticker: TickerSymbol },
}

impl FetchError {
    pub fn unavailable(ticker: &TickerSymbol, cause: impl ToString) -> Self {
        Self::ProviderUnavailable {
            ticker: ticker.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn malformed(ticker: &TickerSymbol, cause: impl ToString) -> Self {
        Self::MalformedResponse {
            ticker: ticker.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn ticker(&self) -> &TickerSymbol {
        match self {
            Self::ProviderUnavailable { ticker, .. }
            | Self::MalformedResponse { ticker, .. }
            | Self::UnprocessableSnapshot { ticker } => ticker,
        }
    }

    /// Short reason without the ticker, for per-ticker diagnostics.
    pub fn reason(&self) -> String {
        match self {
            Self::ProviderUnavailable { cause, .. } => format!("provider unavailable: {cause}"),
            Self::MalformedResponse { cause, .. } => format!("malformed response: {cause}"),
            Self::UnprocessableSnapshot { .. } => "no price and no price history".to_string(),
        }
    }
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError>;

    /// Fetches ignoring any memoized value. Providers without a cache just fetch.
    async fn refresh_snapshot(&self, ticker: &TickerSymbol) -> Result<Snapshot, FetchError> {
        self.fetch_snapshot(ticker).await
    }
}

//! Core screening logic and abstractions

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod log;
pub mod search;
pub mod session;
pub mod snapshot;
pub mod ticker;
pub mod valuation;

// Re-export main types for cleaner imports
pub use aggregate::{AggregateOptions, Aggregation, ResultRow, aggregate};
pub use search::{SearchCandidate, SearchProvider};
pub use snapshot::{FetchError, PricePoint, Snapshot, SnapshotProvider};
pub use ticker::{TickerSet, TickerSymbol};
pub use valuation::{Recommendation, UndervaluedRule, Valuation};

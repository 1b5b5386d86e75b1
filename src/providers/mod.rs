pub mod caching;
pub mod util;
pub mod yahoo_finance;

pub use caching::{CachingSearchProvider, CachingSnapshotProvider};
pub use yahoo_finance::{YahooSearchProvider, YahooSnapshotProvider};

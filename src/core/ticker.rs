//! Ticker symbol normalization

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

/// A trimmed, uppercase ticker symbol such as `BBRI.JK`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TickerSymbol(String);

impl TickerSymbol {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(anyhow!("Ticker symbol cannot be empty"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(anyhow!("Invalid ticker symbol: '{}'", raw.trim()));
        }
        Ok(Self(normalized))
    }

    /// Splits a comma-separated list, skipping blank entries.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TickerSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TickerSymbol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TickerSymbol {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TickerSymbol> for String {
    fn from(value: TickerSymbol) -> Self {
        value.0
    }
}

/// Deduplicated, lexicographically ordered ticker set.
pub type TickerSet = BTreeSet<TickerSymbol>;

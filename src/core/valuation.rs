//! Heuristic fair value and recommendation classification.
//!
//! Everything here is pure: the same snapshot and rule always produce the same
//! valuation, and incomplete input yields absent fields rather than errors.

use crate::core::snapshot::Snapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Earnings multiple applied to EPS to obtain the fair value.
const FAIR_VALUE_MULTIPLE: Decimal = Decimal::from_parts(15, 0, 0, false, 0);
/// Fraction of fair value the price must stay under with the margin-of-safety rule.
const MARGIN_OF_SAFETY: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

const BUY_MAX_PER: Decimal = Decimal::from_parts(15, 0, 0, false, 0);
const BUY_MAX_PBV: Decimal = Decimal::from_parts(15, 0, 0, false, 1);
const BUY_MIN_ROE_PERCENT: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
const SELL_MIN_PER: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndervaluedRule {
    /// `price < fair_value * 0.8`
    #[default]
    MarginOfSafety,
    /// `price < fair_value`
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Recommendation::Buy => "BUY",
                Recommendation::Hold => "HOLD",
                Recommendation::Sell => "SELL",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub fair_value: Option<Decimal>,
    pub per: Option<Decimal>,
    pub undervalued: bool,
    pub recommendation: Recommendation,
}

/// Values a snapshot. Never fails.
pub fn evaluate(snapshot: &Snapshot, rule: UndervaluedRule) -> Valuation {
    let price = snapshot.price;
    let eps = snapshot.eps;

    let fair_value = (eps > Decimal::ZERO).then(|| eps * FAIR_VALUE_MULTIPLE);
    let per = match price {
        Some(price) if !eps.is_zero() => price.checked_div(eps),
        _ => None,
    };

    let undervalued = match (price, fair_value) {
        (Some(price), Some(fair_value)) => match rule {
            UndervaluedRule::MarginOfSafety => price < fair_value * MARGIN_OF_SAFETY,
            UndervaluedRule::Strict => price < fair_value,
        },
        _ => false,
    };

    let recommendation = classify(snapshot, fair_value, per, undervalued);

    Valuation {
        fair_value,
        per,
        undervalued,
        recommendation,
    }
}

fn classify(
    snapshot: &Snapshot,
    fair_value: Option<Decimal>,
    per: Option<Decimal>,
    undervalued: bool,
) -> Recommendation {
    let cheap_earnings = per.is_some_and(|per| per < BUY_MAX_PER);
    let cheap_book = snapshot.pbv.is_some_and(|pbv| pbv < BUY_MAX_PBV);
    let profitable = snapshot
        .roe_percent
        .is_some_and(|roe| roe > BUY_MIN_ROE_PERCENT);
    if undervalued && cheap_earnings && cheap_book && profitable {
        return Recommendation::Buy;
    }

    let expensive_earnings = per.is_some_and(|per| per > SELL_MIN_PER);
    let above_fair_value = matches!(
        (snapshot.price, fair_value),
        (Some(price), Some(fair_value)) if price > fair_value
    );
    if expensive_earnings && above_fair_value {
        return Recommendation::Sell;
    }

    Recommendation::Hold
}

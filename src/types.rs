//! Core types - strong typing for the engine surface

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading account identifier (e.g. "default", "acct-7f3a")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId::new(s)
    }
}

/// A proposed trade, as seen by admission control.
///
/// Sizes are opaque currency amounts; the engine does not know or care
/// about symbols, sides, or venues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Proposed position size in currency units
    pub size_usd: Decimal,
    /// Current total portfolio value
    pub portfolio_value_usd: Decimal,
    /// Estimated price impact of this trade, if the caller has one
    pub price_impact_percent: Option<Decimal>,
}

impl TradeRequest {
    pub fn new(size_usd: Decimal, portfolio_value_usd: Decimal) -> Self {
        Self {
            size_usd,
            portfolio_value_usd,
            price_impact_percent: None,
        }
    }

    pub fn with_price_impact(mut self, percent: Decimal) -> Self {
        self.price_impact_percent = Some(percent);
        self
    }
}

/// A completed trade reported back by the execution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Realized profit or loss (signed)
    pub pnl: Decimal,
    /// Traded volume in currency units
    pub volume: Decimal,
    /// Whether the execution layer counts this as a winning trade
    pub is_win: bool,
}

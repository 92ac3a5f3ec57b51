//! Risk policy - every limit the engine enforces
//!
//! A policy is an immutable value snapshot: operator updates replace it
//! wholesale (or via [`PolicyPatch`]) after validation. Admission control
//! never clamps a bad policy into shape; invalid updates are rejected at
//! this boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Limit configuration for one trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    // Position limits
    /// Max currency units per position
    pub max_position_size_usd: Decimal,
    /// Max total portfolio exposure
    pub max_total_exposure_usd: Decimal,
    /// Max position as percent of portfolio value (0-100)
    pub max_position_percent: Decimal,

    // Loss limits
    /// Max daily loss before the breaker pauses trading
    pub max_daily_loss_usd: Decimal,
    /// Max daily loss as percent of portfolio (0-100)
    pub max_daily_loss_percent: Decimal,
    /// Max drawdown percent before emergency stop (0-100)
    pub max_drawdown_percent: Decimal,
    /// Max losing trades in a row before the breaker pauses
    pub max_consecutive_losses: u32,

    // Rate limits
    pub max_trades_per_minute: u32,
    pub max_trades_per_hour: u32,
    pub max_trades_per_day: u32,
    /// Minimum seconds between trades
    pub min_seconds_between_trades: u32,

    // Execution quality
    /// Max allowed slippage in basis points
    pub max_slippage_bps: u32,
    /// Max price impact percent; twice this value is a hard deny
    pub max_price_impact_percent: Decimal,

    // Recovery behavior
    /// Seconds to wait after a losing trade
    pub cooldown_after_loss_secs: u32,
    /// Shrink position size exponentially while on a losing streak
    pub reduce_position_after_loss: bool,
    /// Adjusted sizes above this require explicit operator confirmation
    pub require_confirmation_above_usd: Decimal,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_position_size_usd: Decimal::from(1_000),
            max_total_exposure_usd: Decimal::from(5_000),
            max_position_percent: Decimal::from(25),
            max_daily_loss_usd: Decimal::from(500),
            max_daily_loss_percent: Decimal::from(10),
            max_drawdown_percent: Decimal::from(20),
            max_consecutive_losses: 5,
            max_trades_per_minute: 5,
            max_trades_per_hour: 50,
            max_trades_per_day: 200,
            min_seconds_between_trades: 3,
            max_slippage_bps: 300,
            max_price_impact_percent: Decimal::from(5),
            cooldown_after_loss_secs: 10,
            reduce_position_after_loss: true,
            require_confirmation_above_usd: Decimal::from(500),
        }
    }
}

impl RiskPolicy {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let policy: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        policy.validate()?;
        Ok(policy)
    }

    /// Reject negative limits and out-of-range percents.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("max_position_size_usd", self.max_position_size_usd),
            ("max_total_exposure_usd", self.max_total_exposure_usd),
            ("max_daily_loss_usd", self.max_daily_loss_usd),
            ("require_confirmation_above_usd", self.require_confirmation_above_usd),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(Error::Policy(format!("{name} must be non-negative, got {value}")));
            }
        }

        let percents = [
            ("max_position_percent", self.max_position_percent),
            ("max_daily_loss_percent", self.max_daily_loss_percent),
            ("max_drawdown_percent", self.max_drawdown_percent),
            ("max_price_impact_percent", self.max_price_impact_percent),
        ];
        for (name, value) in percents {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(Error::Policy(format!("{name} must be in [0,100], got {value}")));
            }
        }

        Ok(())
    }

    /// Apply a partial update, returning the merged policy.
    ///
    /// Validation runs on the merged result; on failure the original policy
    /// is left in force.
    pub fn patched(&self, patch: PolicyPatch) -> Result<Self> {
        let mut merged = self.clone();
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = patch.$field { merged.$field = v; })*
            };
        }
        merge!(
            max_position_size_usd,
            max_total_exposure_usd,
            max_position_percent,
            max_daily_loss_usd,
            max_daily_loss_percent,
            max_drawdown_percent,
            max_consecutive_losses,
            max_trades_per_minute,
            max_trades_per_hour,
            max_trades_per_day,
            min_seconds_between_trades,
            max_slippage_bps,
            max_price_impact_percent,
            cooldown_after_loss_secs,
            reduce_position_after_loss,
            require_confirmation_above_usd,
        );
        merged.validate()?;
        Ok(merged)
    }
}

/// Partial policy replacement: `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyPatch {
    pub max_position_size_usd: Option<Decimal>,
    pub max_total_exposure_usd: Option<Decimal>,
    pub max_position_percent: Option<Decimal>,
    pub max_daily_loss_usd: Option<Decimal>,
    pub max_daily_loss_percent: Option<Decimal>,
    pub max_drawdown_percent: Option<Decimal>,
    pub max_consecutive_losses: Option<u32>,
    pub max_trades_per_minute: Option<u32>,
    pub max_trades_per_hour: Option<u32>,
    pub max_trades_per_day: Option<u32>,
    pub min_seconds_between_trades: Option<u32>,
    pub max_slippage_bps: Option<u32>,
    pub max_price_impact_percent: Option<Decimal>,
    pub cooldown_after_loss_secs: Option<u32>,
    pub reduce_position_after_loss: Option<bool>,
    pub require_confirmation_above_usd: Option<Decimal>,
}

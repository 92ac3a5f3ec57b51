//! Ledger - per-account runtime risk state
//!
//! Daily aggregates, streaks, portfolio aggregates, rate windows, and the
//! circuit-breaker status. The ledger is a value snapshot: the engine owns
//! one, transforms it, and hands copies out for display and persistence.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::BreakerState;
use crate::types::TradeOutcome;

/// Start of the UTC calendar day containing `t`.
pub fn day_start_of(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Bucketed trade counter for one time window (minute, hour).
///
/// The count belongs to the bucket index `unix_ts / window_secs` it was
/// recorded in; reading it under a later index yields zero. No timers, no
/// scheduled decrements - the window expires lazily against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    window_secs: i64,
    bucket: i64,
    count: u32,
}

impl RateWindow {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            bucket: 0,
            count: 0,
        }
    }

    pub fn minute() -> Self {
        Self::new(60)
    }

    pub fn hour() -> Self {
        Self::new(3_600)
    }

    fn index(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.window_secs)
    }

    /// Trades observed in the window containing `now`.
    pub fn observed(&self, now: DateTime<Utc>) -> u32 {
        if self.bucket == self.index(now) {
            self.count
        } else {
            0
        }
    }

    /// Count one trade into the window containing `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        let idx = self.index(now);
        if idx != self.bucket {
            self.bucket = idx;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
    }
}

/// Effect of a day-boundary check, reported so the engine can emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRoll {
    pub rolled: bool,
    pub pause_cleared: bool,
}

/// Per-account runtime state, mutated only by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    // Daily aggregates, zeroed at the day boundary
    pub daily_pnl: Decimal,
    pub daily_pnl_percent: Decimal,
    pub daily_trades: u32,
    pub daily_volume: Decimal,
    pub daily_wins: u32,
    pub daily_losses: u32,

    /// Losing trades in a row; any win resets it
    pub consecutive_losses: u32,

    // Portfolio aggregates
    pub total_exposure: Decimal,
    pub largest_position: Decimal,
    /// Highest portfolio value ever observed
    pub peak_value: Decimal,
    /// Percent decline from peak, recomputed on every portfolio update
    pub current_drawdown: Decimal,

    // Time tracking
    pub last_trade_at: Option<DateTime<Utc>>,
    pub last_risk_check: Option<DateTime<Utc>>,
    pub minute_window: RateWindow,
    pub hour_window: RateWindow,
    /// Boundary marker for the active trading day (UTC midnight)
    pub day_start: DateTime<Utc>,

    /// Circuit-breaker status
    pub breaker: BreakerState,
}

impl Ledger {
    /// Zeroed ledger anchored to the day containing `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_pnl: Decimal::ZERO,
            daily_pnl_percent: Decimal::ZERO,
            daily_trades: 0,
            daily_volume: Decimal::ZERO,
            daily_wins: 0,
            daily_losses: 0,
            consecutive_losses: 0,
            total_exposure: Decimal::ZERO,
            largest_position: Decimal::ZERO,
            peak_value: Decimal::ZERO,
            current_drawdown: Decimal::ZERO,
            last_trade_at: None,
            last_risk_check: None,
            minute_window: RateWindow::minute(),
            hour_window: RateWindow::hour(),
            day_start: day_start_of(now),
            breaker: BreakerState::Active,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.breaker.is_paused()
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.breaker.is_emergency_stopped()
    }

    /// Zero the daily aggregates if `now` has crossed into a new day.
    ///
    /// A non-emergency pause is cleared on rollover; an emergency stop
    /// survives unchanged.
    pub fn roll_day_if_stale(&mut self, now: DateTime<Utc>) -> DayRoll {
        let today = day_start_of(now);
        if self.day_start >= today {
            return DayRoll {
                rolled: false,
                pause_cleared: false,
            };
        }

        self.daily_pnl = Decimal::ZERO;
        self.daily_pnl_percent = Decimal::ZERO;
        self.daily_trades = 0;
        self.daily_volume = Decimal::ZERO;
        self.daily_wins = 0;
        self.daily_losses = 0;
        self.day_start = today;

        let pause_cleared = matches!(self.breaker, BreakerState::Paused { .. });
        if pause_cleared {
            self.breaker = BreakerState::Active;
        }

        DayRoll {
            rolled: true,
            pause_cleared,
        }
    }

    /// Fold one completed trade into the daily aggregates and rate windows.
    pub fn apply_outcome(&mut self, outcome: &TradeOutcome, now: DateTime<Utc>) {
        self.daily_pnl += outcome.pnl;
        self.daily_volume += outcome.volume;
        self.daily_trades = self.daily_trades.saturating_add(1);

        if outcome.is_win {
            self.daily_wins = self.daily_wins.saturating_add(1);
            self.consecutive_losses = 0;
        } else {
            self.daily_losses = self.daily_losses.saturating_add(1);
            self.consecutive_losses = self.consecutive_losses.saturating_add(1);
        }

        self.last_trade_at = Some(now);
        self.minute_window.record(now);
        self.hour_window.record(now);
    }

    /// Track a new mark-to-market portfolio value.
    ///
    /// `peak_value` is a monotonic max; drawdown is always derived from it,
    /// never from history.
    pub fn update_portfolio_value(&mut self, value: Decimal) {
        if value > self.peak_value {
            self.peak_value = value;
        }

        if self.peak_value > Decimal::ZERO {
            let drawdown = (self.peak_value - value) / self.peak_value * Decimal::ONE_HUNDRED;
            self.current_drawdown = drawdown.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
        }
    }

    pub fn update_exposure(&mut self, total_exposure: Decimal, largest_position: Decimal) {
        self.total_exposure = total_exposure;
        self.largest_position = largest_position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 27, h, m, s).unwrap()
    }

    fn outcome(pnl: i64, is_win: bool) -> TradeOutcome {
        TradeOutcome {
            pnl: Decimal::from(pnl),
            volume: Decimal::from(100),
            is_win,
        }
    }

    #[test]
    fn test_rate_window_counts_within_bucket() {
        let mut w = RateWindow::minute();
        w.record(t(12, 0, 1));
        w.record(t(12, 0, 30));
        assert_eq!(w.observed(t(12, 0, 59)), 2);
    }

    #[test]
    fn test_rate_window_expires_on_next_bucket() {
        let mut w = RateWindow::minute();
        w.record(t(12, 0, 59));
        assert_eq!(w.observed(t(12, 1, 0)), 0);
        // and recording in the new bucket starts from scratch
        w.record(t(12, 1, 0));
        assert_eq!(w.observed(t(12, 1, 30)), 1);
    }

    #[test]
    fn test_win_resets_streak_loss_increments() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        ledger.apply_outcome(&outcome(-50, false), t(9, 1, 0));
        ledger.apply_outcome(&outcome(-50, false), t(9, 2, 0));
        assert_eq!(ledger.consecutive_losses, 2);
        ledger.apply_outcome(&outcome(80, true), t(9, 3, 0));
        assert_eq!(ledger.consecutive_losses, 0);
    }

    #[test]
    fn test_wins_plus_losses_equals_trades() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        for i in 0..10 {
            ledger.apply_outcome(&outcome(if i % 3 == 0 { 10 } else { -10 }, i % 3 == 0), t(10, i, 0));
        }
        assert_eq!(ledger.daily_wins + ledger.daily_losses, ledger.daily_trades);
    }

    #[test]
    fn test_drawdown_derived_from_peak() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        ledger.update_portfolio_value(Decimal::from(10_000));
        ledger.update_portfolio_value(Decimal::from(7_900));
        assert_eq!(ledger.current_drawdown, Decimal::from(21));

        // a new peak drives drawdown back toward zero
        ledger.update_portfolio_value(Decimal::from(12_000));
        assert_eq!(ledger.peak_value, Decimal::from(12_000));
        assert_eq!(ledger.current_drawdown, Decimal::ZERO);
    }

    #[test]
    fn test_day_roll_zeroes_daily_aggregates() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        ledger.apply_outcome(&outcome(-100, false), t(9, 5, 0));
        assert_eq!(ledger.daily_trades, 1);

        let next_day = Utc.with_ymd_and_hms(2025, 11, 28, 0, 0, 1).unwrap();
        let roll = ledger.roll_day_if_stale(next_day);
        assert!(roll.rolled);
        assert_eq!(ledger.daily_pnl, Decimal::ZERO);
        assert_eq!(ledger.daily_trades, 0);
        assert_eq!(ledger.day_start, day_start_of(next_day));
        // streak is not a daily aggregate
        assert_eq!(ledger.consecutive_losses, 1);
    }

    #[test]
    fn test_day_roll_clears_plain_pause_not_emergency() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        ledger.breaker = BreakerState::Paused {
            reason: "daily loss limit".into(),
        };
        let next_day = Utc.with_ymd_and_hms(2025, 11, 28, 0, 0, 1).unwrap();
        let roll = ledger.roll_day_if_stale(next_day);
        assert!(roll.pause_cleared);
        assert_eq!(ledger.breaker, BreakerState::Active);

        ledger.breaker = BreakerState::EmergencyStopped {
            reason: "max drawdown".into(),
        };
        let after = Utc.with_ymd_and_hms(2025, 11, 29, 0, 0, 1).unwrap();
        let roll = ledger.roll_day_if_stale(after);
        assert!(roll.rolled);
        assert!(!roll.pause_cleared);
        assert!(ledger.is_emergency_stopped());
    }

    #[test]
    fn test_same_day_is_noop() {
        let mut ledger = Ledger::new(t(9, 0, 0));
        ledger.apply_outcome(&outcome(25, true), t(9, 5, 0));
        let roll = ledger.roll_day_if_stale(t(23, 59, 59));
        assert!(!roll.rolled);
        assert_eq!(ledger.daily_trades, 1);
    }
}

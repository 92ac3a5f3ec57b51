//! Admission control - the per-trade decision pipeline
//!
//! [`evaluate`] is a pure function over (policy, ledger, request, now). It
//! returns the decision plus an optional breaker directive; the engine
//! applies the directive, emits events, and persists. Hard checks run
//! top-to-bottom and short-circuit; the soft sizing pass only shrinks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Ledger;
use crate::policy::RiskPolicy;
use crate::types::TradeRequest;

/// Position-size multiplier applied per consecutive loss when
/// `reduce_position_after_loss` is enabled: 0.75^streak.
pub const LOSS_DERISK_FACTOR: Decimal = Decimal::from_parts(75, 0, 0, false, 2);

/// Why a trade was denied. Expected business outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    #[error("emergency stop active")]
    EmergencyStop,

    #[error("trading paused: {reason}")]
    Paused { reason: String },

    #[error("cooldown: wait {remaining_secs}s")]
    Cooldown { remaining_secs: i64 },

    #[error("rate limit: max {max} trades/minute")]
    MinuteRateLimit { max: u32 },

    #[error("daily limit: max {max} trades/day reached")]
    DailyTradeLimit { max: u32 },

    #[error("daily loss limit reached: ${loss}")]
    DailyLossLimit { loss: Decimal },

    #[error("too many consecutive losses: {count}")]
    ConsecutiveLosses { count: u32 },

    #[error("max drawdown exceeded: {drawdown}%")]
    DrawdownExceeded { drawdown: Decimal },

    #[error("max exposure (${max}) reached")]
    ExposureExhausted { max: Decimal },

    #[error("price impact too high: {impact}%")]
    PriceImpactTooHigh { impact: Decimal },
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Denied {
        reason: DenyReason,
        /// Non-fatal warnings accumulated before the hard deny
        warnings: Vec<String>,
    },
    Allowed {
        /// Size the trade may execute at (possibly smaller than requested)
        size_usd: Decimal,
        /// True when `size_usd` differs from the requested size
        adjusted: bool,
        warnings: Vec<String>,
        /// Size exceeds the confirmation threshold; caller must obtain
        /// explicit operator confirmation before executing
        requires_confirmation: bool,
    },
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed { .. })
    }

    pub fn approved_size(&self) -> Option<Decimal> {
        match self {
            AdmissionDecision::Allowed { size_usd, .. } => Some(*size_usd),
            AdmissionDecision::Denied { .. } => None,
        }
    }

    fn denied(reason: DenyReason) -> Self {
        AdmissionDecision::Denied {
            reason,
            warnings: Vec::new(),
        }
    }
}

/// Breaker transition requested by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Directive {
    Pause(String),
    EmergencyStop(String),
}

pub(crate) struct Evaluation {
    pub decision: AdmissionDecision,
    pub directive: Option<Directive>,
}

impl Evaluation {
    fn deny(reason: DenyReason) -> Self {
        Self {
            decision: AdmissionDecision::denied(reason),
            directive: None,
        }
    }
}

/// Run the full check pipeline. Pure: no side effects, no clock reads.
///
/// Assumes the day-boundary resetter has already run for `now` (the engine
/// does this before calling in, except for the terminal emergency state).
pub(crate) fn evaluate(
    policy: &RiskPolicy,
    ledger: &Ledger,
    request: &TradeRequest,
    now: DateTime<Utc>,
) -> Evaluation {
    // 1. Terminal state wins over everything.
    if ledger.is_emergency_stopped() {
        return Evaluation::deny(DenyReason::EmergencyStop);
    }

    // 2. Plain pause: deny with the stored reason.
    if let Some(reason) = ledger.breaker.pause_reason() {
        return Evaluation::deny(DenyReason::Paused {
            reason: reason.to_string(),
        });
    }

    // 3. Cooldown between trades.
    if let Some(last) = ledger.last_trade_at {
        let elapsed_ms = (now - last).num_milliseconds().max(0);
        let required_ms = i64::from(policy.min_seconds_between_trades) * 1_000;
        if elapsed_ms < required_ms {
            // round the remainder up to whole seconds
            let remaining_secs = (required_ms - elapsed_ms + 999) / 1_000;
            return Evaluation::deny(DenyReason::Cooldown { remaining_secs });
        }
    }

    // 4. Per-minute rate limit.
    if ledger.minute_window.observed(now) >= policy.max_trades_per_minute {
        return Evaluation::deny(DenyReason::MinuteRateLimit {
            max: policy.max_trades_per_minute,
        });
    }

    // 5. Per-day trade count.
    if ledger.daily_trades >= policy.max_trades_per_day {
        return Evaluation::deny(DenyReason::DailyTradeLimit {
            max: policy.max_trades_per_day,
        });
    }

    // 6. Daily loss limit: deny and pause.
    if ledger.daily_pnl <= -policy.max_daily_loss_usd {
        return Evaluation {
            decision: AdmissionDecision::denied(DenyReason::DailyLossLimit {
                loss: ledger.daily_pnl.abs(),
            }),
            directive: Some(Directive::Pause(format!(
                "daily loss limit (${}) reached",
                policy.max_daily_loss_usd
            ))),
        };
    }

    // 7. Consecutive-loss streak: deny and pause.
    if ledger.consecutive_losses >= policy.max_consecutive_losses {
        return Evaluation {
            decision: AdmissionDecision::denied(DenyReason::ConsecutiveLosses {
                count: ledger.consecutive_losses,
            }),
            directive: Some(Directive::Pause(format!(
                "{} consecutive losses",
                policy.max_consecutive_losses
            ))),
        };
    }

    // 8. Drawdown: deny and emergency-stop.
    if ledger.current_drawdown >= policy.max_drawdown_percent {
        return Evaluation {
            decision: AdmissionDecision::denied(DenyReason::DrawdownExceeded {
                drawdown: ledger.current_drawdown,
            }),
            directive: Some(Directive::EmergencyStop(format!(
                "max drawdown ({}%) exceeded",
                policy.max_drawdown_percent
            ))),
        };
    }

    // 9. Soft sizing pass: shrink, never grow.
    let mut warnings = Vec::new();
    let mut size = request.size_usd;

    if size > policy.max_position_size_usd {
        size = policy.max_position_size_usd;
        warnings.push(format!(
            "position reduced to max ${}",
            policy.max_position_size_usd
        ));
    }

    let percent_cap =
        policy.max_position_percent / Decimal::ONE_HUNDRED * request.portfolio_value_usd;
    if size > percent_cap {
        size = percent_cap;
        warnings.push(format!(
            "position reduced to {}% of portfolio",
            policy.max_position_percent
        ));
    }

    let headroom = policy.max_total_exposure_usd - ledger.total_exposure;
    if headroom <= Decimal::ZERO {
        return Evaluation {
            decision: AdmissionDecision::Denied {
                reason: DenyReason::ExposureExhausted {
                    max: policy.max_total_exposure_usd,
                },
                warnings,
            },
            directive: None,
        };
    }
    if size > headroom {
        size = headroom;
        warnings.push("position reduced to fit exposure limit".to_string());
    }

    if let Some(impact) = request.price_impact_percent {
        if impact > policy.max_price_impact_percent {
            warnings.push(format!("high price impact: {impact}%"));
            if impact > policy.max_price_impact_percent * Decimal::TWO {
                return Evaluation {
                    decision: AdmissionDecision::Denied {
                        reason: DenyReason::PriceImpactTooHigh { impact },
                        warnings,
                    },
                    directive: None,
                };
            }
        }
    }

    if ledger.consecutive_losses > 0 && policy.reduce_position_after_loss {
        // 0.75^streak; the exponent is capped since the factor is
        // negligible long before 32 losses.
        let mut factor = Decimal::ONE;
        for _ in 0..ledger.consecutive_losses.min(32) {
            factor *= LOSS_DERISK_FACTOR;
        }
        let reduced = size * factor;
        if reduced < size {
            size = reduced;
            warnings.push(format!(
                "position reduced after {} losses",
                ledger.consecutive_losses
            ));
        }
    }

    // 10. Confirmation threshold on the final size.
    let requires_confirmation = size > policy.require_confirmation_above_usd;

    Evaluation {
        decision: AdmissionDecision::Allowed {
            size_usd: size,
            adjusted: size != request.size_usd,
            warnings,
            requires_confirmation,
        },
        directive: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BreakerState;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 27, 12, 0, 0).unwrap()
    }

    fn fresh() -> (RiskPolicy, Ledger) {
        (RiskPolicy::default(), Ledger::new(t0()))
    }

    fn request(size: i64, portfolio: i64) -> TradeRequest {
        TradeRequest::new(Decimal::from(size), Decimal::from(portfolio))
    }

    #[test]
    fn test_emergency_stop_denies_everything() {
        let (policy, mut ledger) = fresh();
        ledger.breaker = BreakerState::EmergencyStopped {
            reason: "max drawdown".into(),
        };
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        assert_eq!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::EmergencyStop,
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_paused_denies_with_stored_reason() {
        let (policy, mut ledger) = fresh();
        ledger.breaker = BreakerState::Paused {
            reason: "operator pause".into(),
        };
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        match eval.decision {
            AdmissionDecision::Denied {
                reason: DenyReason::Paused { reason },
                ..
            } => assert_eq!(reason, "operator pause"),
            other => panic!("expected paused denial, got {other:?}"),
        }
    }

    #[test]
    fn test_cooldown_reports_remaining_seconds() {
        let (policy, mut ledger) = fresh();
        ledger.last_trade_at = Some(t0());
        // 1 second later with min_seconds_between_trades = 3
        let eval = evaluate(
            &policy,
            &ledger,
            &request(10, 100_000),
            t0() + chrono::Duration::seconds(1),
        );
        assert_eq!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::Cooldown { remaining_secs: 2 },
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_minute_rate_limit() {
        let (policy, mut ledger) = fresh();
        for _ in 0..policy.max_trades_per_minute {
            ledger.minute_window.record(t0());
        }
        // past the cooldown, same minute bucket
        let now = t0() + chrono::Duration::seconds(10);
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), now);
        assert_eq!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::MinuteRateLimit { max: 5 },
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_daily_trade_limit() {
        let (policy, mut ledger) = fresh();
        ledger.daily_trades = policy.max_trades_per_day;
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        assert_eq!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::DailyTradeLimit { max: 200 },
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_daily_loss_limit_pauses() {
        let (policy, mut ledger) = fresh();
        ledger.daily_pnl = Decimal::from(-500);
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        assert!(matches!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::DailyLossLimit { .. },
                ..
            }
        ));
        assert_eq!(
            eval.directive,
            Some(Directive::Pause("daily loss limit ($500) reached".into()))
        );
    }

    #[test]
    fn test_consecutive_losses_pause() {
        let (policy, mut ledger) = fresh();
        ledger.consecutive_losses = policy.max_consecutive_losses;
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        assert!(matches!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::ConsecutiveLosses { count: 5 },
                ..
            }
        ));
        assert_eq!(
            eval.directive,
            Some(Directive::Pause("5 consecutive losses".into()))
        );
    }

    #[test]
    fn test_drawdown_triggers_emergency_stop() {
        let (policy, mut ledger) = fresh();
        ledger.current_drawdown = Decimal::from(21);
        let eval = evaluate(&policy, &ledger, &request(10, 100_000), t0());
        assert!(matches!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::DrawdownExceeded { .. },
                ..
            }
        ));
        assert_eq!(
            eval.directive,
            Some(Directive::EmergencyStop("max drawdown (20%) exceeded".into()))
        );
    }

    #[test]
    fn test_size_clamped_to_absolute_and_percent_caps() {
        // 2000 requested, max size 1000, 25% of 3000 portfolio = 750
        let (policy, ledger) = fresh();
        let eval = evaluate(&policy, &ledger, &request(2_000, 3_000), t0());
        match eval.decision {
            AdmissionDecision::Allowed {
                size_usd,
                adjusted,
                warnings,
                requires_confirmation,
            } => {
                assert_eq!(size_usd, Decimal::from(750));
                assert!(adjusted);
                assert_eq!(warnings.len(), 2);
                // 750 > 500 confirmation threshold
                assert!(requires_confirmation);
            }
            other => panic!("expected allowed, got {other:?}"),
        }
    }

    #[test]
    fn test_exposure_headroom_clamps_then_exhausts() {
        let (policy, mut ledger) = fresh();
        ledger.total_exposure = Decimal::from(4_800);
        let eval = evaluate(&policy, &ledger, &request(400, 100_000), t0());
        match eval.decision {
            AdmissionDecision::Allowed { size_usd, .. } => {
                assert_eq!(size_usd, Decimal::from(200));
            }
            other => panic!("expected clamped allow, got {other:?}"),
        }

        ledger.total_exposure = Decimal::from(5_000);
        let eval = evaluate(&policy, &ledger, &request(400, 100_000), t0());
        assert!(matches!(
            eval.decision,
            AdmissionDecision::Denied {
                reason: DenyReason::ExposureExhausted { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_price_impact_warns_then_denies_at_double() {
        let (policy, ledger) = fresh();

        // above limit (5%) but below 2x: warn only
        let req = request(100, 100_000).with_price_impact(Decimal::from(7));
        let eval = evaluate(&policy, &ledger, &req, t0());
        match eval.decision {
            AdmissionDecision::Allowed { warnings, .. } => {
                assert!(warnings.iter().any(|w| w.contains("price impact")));
            }
            other => panic!("expected allowed with warning, got {other:?}"),
        }

        // above 2x: hard deny, warnings kept
        let req = request(100, 100_000).with_price_impact(Decimal::from(11));
        let eval = evaluate(&policy, &ledger, &req, t0());
        match eval.decision {
            AdmissionDecision::Denied { reason, warnings } => {
                assert_eq!(
                    reason,
                    DenyReason::PriceImpactTooHigh {
                        impact: Decimal::from(11)
                    }
                );
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected denied, got {other:?}"),
        }
    }

    #[test]
    fn test_losing_streak_shrinks_size_exponentially() {
        let (policy, mut ledger) = fresh();
        ledger.consecutive_losses = 2;
        let eval = evaluate(&policy, &ledger, &request(400, 100_000), t0());
        match eval.decision {
            AdmissionDecision::Allowed {
                size_usd, warnings, ..
            } => {
                // 400 * 0.75^2 = 225
                assert_eq!(size_usd, Decimal::from(225));
                assert!(warnings.iter().any(|w| w.contains("after 2 losses")));
            }
            other => panic!("expected allowed, got {other:?}"),
        }
    }

    #[test]
    fn test_derisk_disabled_by_policy() {
        let (mut policy, mut ledger) = fresh();
        policy.reduce_position_after_loss = false;
        ledger.consecutive_losses = 2;
        let eval = evaluate(&policy, &ledger, &request(400, 100_000), t0());
        assert_eq!(eval.decision.approved_size(), Some(Decimal::from(400)));
    }

    #[test]
    fn test_unadjusted_small_trade_passes_clean() {
        let (policy, ledger) = fresh();
        let eval = evaluate(&policy, &ledger, &request(100, 100_000), t0());
        assert_eq!(
            eval.decision,
            AdmissionDecision::Allowed {
                size_usd: Decimal::from(100),
                adjusted: false,
                warnings: vec![],
                requires_confirmation: false,
            }
        );
    }

    #[test]
    fn test_allowed_size_never_exceeds_caps() {
        let (policy, ledger) = fresh();
        for raw in [1, 50, 499, 500, 750, 1_000, 2_500, 10_000, 1_000_000] {
            let portfolio = Decimal::from(3_000);
            let eval = evaluate(&policy, &ledger, &request(raw, 3_000), t0());
            if let AdmissionDecision::Allowed { size_usd, .. } = eval.decision {
                assert!(size_usd <= policy.max_position_size_usd);
                assert!(size_usd <= policy.max_position_percent / Decimal::ONE_HUNDRED * portfolio);
            }
        }
    }
}

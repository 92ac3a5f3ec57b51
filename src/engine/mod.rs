//! Risk engine - admission control, outcome recording, breaker transitions
//!
//! One [`RiskEngine`] per trading account, constructed with an injected
//! policy, clock, event sender, and (optionally) a persistence sender. All
//! mutating operations end with an explicit persistence request; the
//! decision path never touches I/O.

pub mod admission;
pub mod breaker;

pub use admission::{AdmissionDecision, DenyReason, LOSS_DERISK_FACTOR};
pub use breaker::BreakerState;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::{AlertSeverity, RiskEvent};
use crate::clock::Clock;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::policy::{PolicyPatch, RiskPolicy};
use crate::store::PersistRequest;
use crate::types::{AccountId, TradeOutcome, TradeRequest};

use admission::Directive;

// Post-trade advisory thresholds, as fractions of the configured limits.
const DAILY_LOSS_ALERT_HIGH: Decimal = Decimal::from_parts(80, 0, 0, false, 0);
const DAILY_LOSS_ALERT_MEDIUM: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
const DRAWDOWN_ALERT_FRACTION: Decimal = Decimal::from_parts(8, 0, 0, false, 1);
const STATUS_LOSS_FRACTION: Decimal = Decimal::from_parts(8, 0, 0, false, 1);
const STATUS_DRAWDOWN_FRACTION: Decimal = Decimal::from_parts(7, 0, 0, false, 1);

/// Health summary for display surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatus {
    pub healthy: bool,
    pub advisories: Vec<String>,
    pub daily_pnl: Decimal,
    pub current_drawdown: Decimal,
    pub consecutive_losses: u32,
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// Risk-control engine for a single trading account.
pub struct RiskEngine {
    account: AccountId,
    policy: RiskPolicy,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    events: flume::Sender<RiskEvent>,
    persist: Option<flume::Sender<PersistRequest>>,
}

impl RiskEngine {
    /// Fresh engine with a zeroed ledger anchored to the current day.
    pub fn new(
        account: AccountId,
        policy: RiskPolicy,
        clock: Arc<dyn Clock>,
        events: flume::Sender<RiskEvent>,
    ) -> Result<Self> {
        policy.validate()?;
        let ledger = Ledger::new(clock.now());
        Ok(Self {
            account,
            policy,
            ledger,
            clock,
            events,
            persist: None,
        })
    }

    /// Engine restored from persisted blobs.
    pub fn restore(
        account: AccountId,
        policy: RiskPolicy,
        ledger: Option<Ledger>,
        clock: Arc<dyn Clock>,
        events: flume::Sender<RiskEvent>,
    ) -> Result<Self> {
        policy.validate()?;
        let ledger = ledger.unwrap_or_else(|| Ledger::new(clock.now()));
        Ok(Self {
            account,
            policy,
            ledger,
            clock,
            events,
            persist: None,
        })
    }

    /// Route state snapshots to a background persister.
    pub fn with_persistence(mut self, persist: flume::Sender<PersistRequest>) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Read-only copies of the active policy and ledger.
    pub fn snapshot(&self) -> (RiskPolicy, Ledger) {
        (self.policy.clone(), self.ledger.clone())
    }

    // ─── Admission ───

    /// Decide whether a proposed trade may proceed, and at what size.
    ///
    /// Runs the day-boundary resetter first (unless emergency-stopped),
    /// then the check pipeline; breaker directives fire before the
    /// decision is returned, so a breach affects this caller and every
    /// subsequent one.
    pub fn check_trade(&mut self, request: &TradeRequest) -> AdmissionDecision {
        let now = self.clock.now();

        if !self.ledger.is_emergency_stopped() {
            let roll = self.ledger.roll_day_if_stale(now);
            if roll.rolled {
                info!(account = %self.account, "new trading day, daily limits reset");
                self.emit(RiskEvent::DayRolled);
                if roll.pause_cleared {
                    self.emit(RiskEvent::Resumed);
                }
            }
        }

        let eval = admission::evaluate(&self.policy, &self.ledger, request, now);
        match eval.directive {
            Some(Directive::Pause(reason)) => {
                if self.ledger.breaker.trigger_pause(reason.clone()) {
                    self.emit(RiskEvent::Paused { reason });
                }
            }
            Some(Directive::EmergencyStop(reason)) => {
                self.ledger.breaker.trigger_emergency_stop(reason.clone());
                self.emit(RiskEvent::EmergencyStopped { reason });
            }
            None => {}
        }

        self.ledger.last_risk_check = Some(now);
        self.emit_state_changed();
        self.request_persist();
        eval.decision
    }

    // ─── Outcome recording ───

    /// Fold a completed trade into the ledger and run post-trade alerts.
    pub fn record_trade(&mut self, outcome: &TradeOutcome) {
        let now = self.clock.now();
        self.ledger.apply_outcome(outcome, now);
        self.post_trade_alerts();
        self.emit_state_changed();
        self.request_persist();
    }

    /// Track a new mark-to-market portfolio value.
    pub fn update_portfolio_value(&mut self, value: Decimal) {
        self.ledger.update_portfolio_value(value);
        self.emit_state_changed();
        self.request_persist();
    }

    /// Overwrite the exposure aggregates reported by the execution layer.
    pub fn update_exposure(&mut self, total_exposure: Decimal, largest_position: Decimal) {
        self.ledger.update_exposure(total_exposure, largest_position);
        self.request_persist();
    }

    // ─── Policy updates ───

    /// Replace the whole policy. Takes effect on the next check.
    pub fn update_policy(&mut self, policy: RiskPolicy) -> Result<()> {
        policy.validate()?;
        self.policy = policy;
        info!(account = %self.account, "risk policy replaced");
        self.request_persist();
        Ok(())
    }

    /// Apply a partial policy update; an invalid patch changes nothing.
    pub fn patch_policy(&mut self, patch: PolicyPatch) -> Result<()> {
        self.policy = self.policy.patched(patch)?;
        info!(account = %self.account, "risk policy patched");
        self.request_persist();
        Ok(())
    }

    // ─── Manual controls ───

    pub fn pause(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.ledger.breaker.trigger_pause(reason.clone()) {
            self.emit(RiskEvent::Paused { reason });
        }
        self.request_persist();
    }

    /// Lift a plain pause. Fails while emergency-stopped.
    pub fn resume(&mut self) -> Result<()> {
        self.ledger.breaker.resume()?;
        info!(account = %self.account, "trading resumed");
        self.emit(RiskEvent::Resumed);
        self.request_persist();
        Ok(())
    }

    pub fn emergency_stop(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.ledger.breaker.trigger_emergency_stop(reason.clone());
        self.emit(RiskEvent::EmergencyStopped { reason });
        self.request_persist();
    }

    /// Manual-only recovery; clears the stop and the losing streak.
    pub fn reset_emergency_stop(&mut self) {
        self.ledger.breaker.reset_emergency();
        self.ledger.consecutive_losses = 0;
        info!(account = %self.account, "emergency stop reset");
        self.emit(RiskEvent::EmergencyReset);
        self.request_persist();
    }

    // ─── Status ───

    /// Health summary with advisory messages for display.
    pub fn risk_status(&self) -> RiskStatus {
        let mut advisories = Vec::new();

        if let Some(reason) = self.ledger.breaker.pause_reason() {
            advisories.push(format!("trading paused: {reason}"));
        }

        if self.ledger.daily_pnl < Decimal::ZERO && self.policy.max_daily_loss_usd > Decimal::ZERO
        {
            let loss = -self.ledger.daily_pnl;
            if loss > self.policy.max_daily_loss_usd * STATUS_LOSS_FRACTION {
                let pct = (loss / self.policy.max_daily_loss_usd * Decimal::ONE_HUNDRED).round();
                advisories.push(format!("approaching daily loss limit ({pct}%)"));
            }
        }

        if self.policy.max_consecutive_losses > 0
            && self.ledger.consecutive_losses >= self.policy.max_consecutive_losses.saturating_sub(1)
            && self.ledger.consecutive_losses > 0
        {
            advisories.push(format!(
                "near consecutive loss limit ({})",
                self.ledger.consecutive_losses
            ));
        }

        if self.ledger.current_drawdown
            > self.policy.max_drawdown_percent * STATUS_DRAWDOWN_FRACTION
        {
            advisories.push(format!(
                "high drawdown ({}%)",
                self.ledger.current_drawdown.round_dp(1)
            ));
        }

        RiskStatus {
            healthy: advisories.is_empty(),
            advisories,
            daily_pnl: self.ledger.daily_pnl,
            current_drawdown: self.ledger.current_drawdown,
            consecutive_losses: self.ledger.consecutive_losses,
            last_trade_at: self.ledger.last_trade_at,
        }
    }

    // ─── Internals ───

    /// Advisory alerts after each recorded trade. Never block anything.
    fn post_trade_alerts(&self) {
        if self.ledger.daily_pnl < Decimal::ZERO && self.policy.max_daily_loss_usd > Decimal::ZERO
        {
            let loss_pct = -self.ledger.daily_pnl / self.policy.max_daily_loss_usd
                * Decimal::ONE_HUNDRED;
            if loss_pct >= DAILY_LOSS_ALERT_HIGH {
                self.alert(
                    format!("approaching daily loss limit: {}%", loss_pct.round()),
                    AlertSeverity::High,
                );
            } else if loss_pct >= DAILY_LOSS_ALERT_MEDIUM {
                self.alert(
                    format!("daily loss at {}% of limit", loss_pct.round()),
                    AlertSeverity::Medium,
                );
            }
        }

        if self.policy.max_consecutive_losses > 0
            && self.ledger.consecutive_losses > 0
            && self.ledger.consecutive_losses >= self.policy.max_consecutive_losses.saturating_sub(1)
        {
            self.alert(
                format!(
                    "{} consecutive losses, one more triggers pause",
                    self.ledger.consecutive_losses
                ),
                AlertSeverity::High,
            );
        }

        let drawdown_warn = self.policy.max_drawdown_percent * DRAWDOWN_ALERT_FRACTION;
        if self.policy.max_drawdown_percent > Decimal::ZERO
            && self.ledger.current_drawdown >= drawdown_warn
        {
            self.alert(
                format!(
                    "drawdown at {}%, emergency stop at {}%",
                    self.ledger.current_drawdown.round_dp(1),
                    self.policy.max_drawdown_percent
                ),
                AlertSeverity::Critical,
            );
        }
    }

    fn alert(&self, message: String, severity: AlertSeverity) {
        self.emit(RiskEvent::Alert { message, severity });
    }

    fn emit(&self, event: RiskEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn emit_state_changed(&self) {
        self.emit(RiskEvent::StateChanged {
            ledger: self.ledger.clone(),
        });
    }

    fn request_persist(&self) {
        if let Some(persist) = &self.persist {
            let request = PersistRequest {
                account: self.account.clone(),
                policy: self.policy.clone(),
                ledger: self.ledger.clone(),
            };
            if persist.send(request).is_err() {
                tracing::warn!(account = %self.account, "persister gone, state not saved");
            }
        }
    }
}

//! Circuit breaker - Active / Paused / EmergencyStopped
//!
//! Paused is recoverable (operator resume, or day rollover for pauses the
//! engine itself triggered). EmergencyStopped is terminal until an explicit
//! manual reset; nothing in the engine clears it automatically.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Breaker status, persisted as part of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    Active,
    Paused { reason: String },
    EmergencyStopped { reason: String },
}

impl BreakerState {
    /// An emergency stop always implies paused.
    pub fn is_paused(&self) -> bool {
        !matches!(self, BreakerState::Active)
    }

    pub fn is_emergency_stopped(&self) -> bool {
        matches!(self, BreakerState::EmergencyStopped { .. })
    }

    pub fn pause_reason(&self) -> Option<&str> {
        match self {
            BreakerState::Active => None,
            BreakerState::Paused { reason } => Some(reason),
            BreakerState::EmergencyStopped { reason } => Some(reason),
        }
    }

    /// Active|Paused -> Paused. Never demotes an emergency stop.
    ///
    /// Returns true if the state changed (or the reason was replaced).
    pub fn trigger_pause(&mut self, reason: impl Into<String>) -> bool {
        if self.is_emergency_stopped() {
            return false;
        }
        let reason = reason.into();
        warn!(%reason, "trading paused");
        *self = BreakerState::Paused { reason };
        true
    }

    /// Any state -> EmergencyStopped.
    pub fn trigger_emergency_stop(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(%reason, "EMERGENCY STOP");
        *self = BreakerState::EmergencyStopped { reason };
    }

    /// Lift a plain pause. Fails loudly while emergency-stopped.
    pub fn resume(&mut self) -> Result<()> {
        if self.is_emergency_stopped() {
            return Err(Error::State(
                "cannot resume: emergency stop requires manual reset".into(),
            ));
        }
        *self = BreakerState::Active;
        Ok(())
    }

    /// Manual-only recovery from EmergencyStopped (clears a pause too).
    pub fn reset_emergency(&mut self) {
        *self = BreakerState::Active;
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Active => write!(f, "active"),
            BreakerState::Paused { reason } => write!(f, "paused ({reason})"),
            BreakerState::EmergencyStopped { reason } => write!(f, "emergency-stopped ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_resume() {
        let mut breaker = BreakerState::Active;
        assert!(breaker.trigger_pause("daily loss limit"));
        assert!(breaker.is_paused());
        assert!(!breaker.is_emergency_stopped());
        assert_eq!(breaker.pause_reason(), Some("daily loss limit"));

        breaker.resume().unwrap();
        assert_eq!(breaker, BreakerState::Active);
    }

    #[test]
    fn test_pause_does_not_demote_emergency() {
        let mut breaker = BreakerState::EmergencyStopped {
            reason: "max drawdown".into(),
        };
        assert!(!breaker.trigger_pause("rate limit"));
        assert!(breaker.is_emergency_stopped());
        assert_eq!(breaker.pause_reason(), Some("max drawdown"));
    }

    #[test]
    fn test_resume_fails_while_emergency_stopped() {
        let mut breaker = BreakerState::EmergencyStopped {
            reason: "max drawdown".into(),
        };
        let err = breaker.resume().unwrap_err();
        assert!(matches!(err, Error::State(_)));
        // state unchanged
        assert!(breaker.is_emergency_stopped());
    }

    #[test]
    fn test_manual_reset_clears_everything() {
        let mut breaker = BreakerState::EmergencyStopped {
            reason: "max drawdown".into(),
        };
        breaker.reset_emergency();
        assert_eq!(breaker, BreakerState::Active);
    }
}

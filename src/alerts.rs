//! Risk events and alert severities
//!
//! The engine has no callback hooks; it pushes [`RiskEvent`]s into a flume
//! channel owned by the caller, who drains them and forwards to whatever
//! notification surface is in front (dashboard, bot, log shipper).

use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;

/// Advisory alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Notification emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RiskEvent {
    /// Advisory only; never blocks trades
    Alert {
        message: String,
        severity: AlertSeverity,
    },
    /// Breaker moved to Paused
    Paused { reason: String },
    /// Breaker moved to EmergencyStopped
    EmergencyStopped { reason: String },
    /// Pause lifted by an operator
    Resumed,
    /// Emergency stop cleared after manual review
    EmergencyReset,
    /// Daily aggregates were zeroed for a new trading day
    DayRolled,
    /// Ledger snapshot after a mutating operation
    StateChanged { ledger: Ledger },
}

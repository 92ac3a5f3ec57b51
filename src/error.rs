//! Error handling - operational failures only
//!
//! Expected business outcomes (a denied trade) are not errors; they are
//! returned as structured [`AdmissionDecision`](crate::engine::AdmissionDecision)
//! values. This hierarchy covers the failures around the decision path.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// riskgate error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Invalid policy update (negative limit, out-of-range percent)
    #[error("Policy: {0}")]
    Policy(String),

    /// Invalid state transition (e.g. resume while emergency-stopped)
    #[error("Invalid state: {0}")]
    State(String),

    /// Persistence port failures
    #[error("Persistence: {0}")]
    Persistence(String),

    /// Serialization
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
}

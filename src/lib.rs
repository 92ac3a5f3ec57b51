//! riskgate - policy-driven trade admission control and circuit breakers
//!
//! Decides, for every proposed trade, whether it may proceed and at what
//! size, and whether trading for the account must pause or halt entirely.

// Public modules
pub mod alerts;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use alerts::{AlertSeverity, RiskEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AdmissionDecision, BreakerState, DenyReason, RiskEngine, RiskStatus};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use policy::{PolicyPatch, RiskPolicy};
pub use registry::AccountRegistry;
pub use store::{JsonFileStore, MemoryStore, PersistRequest, StateStore};
pub use types::{AccountId, TradeOutcome, TradeRequest};

//! Account registry - one engine per trading account
//!
//! Engines live behind a per-account mutex so admission checks and their
//! breaker transitions are serialized within an account while distinct
//! accounts proceed fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::alerts::RiskEvent;
use crate::clock::Clock;
use crate::engine::RiskEngine;
use crate::error::Result;
use crate::policy::RiskPolicy;
use crate::store::{self, PersistRequest, StateStore};
use crate::types::AccountId;

pub struct AccountRegistry {
    engines: RwLock<HashMap<AccountId, Arc<Mutex<RiskEngine>>>>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    default_policy: RiskPolicy,
    events: flume::Sender<RiskEvent>,
    persist: flume::Sender<PersistRequest>,
}

impl AccountRegistry {
    /// Build a registry around a store and a default policy for new
    /// accounts. Spawns the background persister (needs a tokio runtime).
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        default_policy: RiskPolicy,
        events: flume::Sender<RiskEvent>,
    ) -> Result<Self> {
        default_policy.validate()?;
        let persist = store::spawn_persister(store.clone());
        Ok(Self {
            engines: RwLock::new(HashMap::new()),
            store,
            clock,
            default_policy,
            events,
            persist,
        })
    }

    /// Engine for an account, restored from the store or created zeroed on
    /// first use.
    pub async fn open(&self, account: impl Into<AccountId>) -> Result<Arc<Mutex<RiskEngine>>> {
        let account = account.into();
        if let Some(engine) = self.engines.read().get(&account) {
            return Ok(engine.clone());
        }

        // load outside the map lock; a racing open() for the same account
        // just wastes one restore
        let (policy, ledger) = match store::load_account(self.store.as_ref(), &account).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(account = %account, error = %e, "failed to load persisted risk state, starting fresh");
                (None, None)
            }
        };

        let policy = match policy {
            Some(p) if p.validate().is_ok() => p,
            Some(_) => {
                warn!(account = %account, "persisted policy invalid, using default");
                self.default_policy.clone()
            }
            None => self.default_policy.clone(),
        };

        let engine = RiskEngine::restore(
            account.clone(),
            policy,
            ledger,
            self.clock.clone(),
            self.events.clone(),
        )?
        .with_persistence(self.persist.clone());

        let mut engines = self.engines.write();
        Ok(engines
            .entry(account)
            .or_insert_with(|| Arc::new(Mutex::new(engine)))
            .clone())
    }

    /// Accounts with an open engine.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.engines.read().keys().cloned().collect()
    }

    /// Halt every open account at once.
    pub fn global_emergency_stop(&self, reason: &str) {
        let engines: Vec<_> = self.engines.read().values().cloned().collect();
        for engine in engines {
            engine.lock().emergency_stop(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::types::TradeRequest;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn registry() -> (AccountRegistry, flume::Receiver<RiskEvent>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 11, 27, 12, 0, 0).unwrap(),
        ));
        let (tx, rx) = flume::unbounded();
        let registry = AccountRegistry::new(
            Arc::new(MemoryStore::new()),
            clock,
            RiskPolicy::default(),
            tx,
        )
        .unwrap();
        (registry, rx)
    }

    #[tokio::test]
    async fn test_open_returns_same_engine() {
        let (registry, _rx) = registry();
        let a = registry.open("acct").await.unwrap();
        let b = registry.open("acct").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_accounts_are_independent() {
        let (registry, _rx) = registry();
        let a = registry.open("alpha").await.unwrap();
        let b = registry.open("beta").await.unwrap();

        a.lock().pause("manual hold");
        let request = TradeRequest::new(Decimal::from(100), Decimal::from(100_000));
        assert!(!a.lock().check_trade(&request).is_allowed());
        assert!(b.lock().check_trade(&request).is_allowed());
    }

    #[tokio::test]
    async fn test_global_emergency_stop_halts_all() {
        let (registry, _rx) = registry();
        let a = registry.open("alpha").await.unwrap();
        let b = registry.open("beta").await.unwrap();

        registry.global_emergency_stop("operator halt");

        let request = TradeRequest::new(Decimal::from(100), Decimal::from(100_000));
        assert!(a.lock().ledger().is_emergency_stopped());
        assert!(!b.lock().check_trade(&request).is_allowed());
    }
}

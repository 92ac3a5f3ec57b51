//! Persistence port - durable key-value medium for policy + ledger blobs
//!
//! The engine never writes directly: mutating operations push a
//! [`PersistRequest`] to a background persister task, which serializes the
//! snapshots and writes them through the [`StateStore`] port. Failures are
//! logged and swallowed; a lost write never changes an admission decision.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::policy::RiskPolicy;
use crate::types::AccountId;

pub fn policy_key(account: &AccountId) -> String {
    format!("risk-policy:{account}")
}

pub fn ledger_key(account: &AccountId) -> String {
    format!("risk-ledger:{account}")
}

/// Durable key-value medium. Values are opaque JSON strings.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys contain ':' and account ids are caller-supplied
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Snapshot of one account's state, queued for a background write.
#[derive(Debug, Clone)]
pub struct PersistRequest {
    pub account: AccountId,
    pub policy: RiskPolicy,
    pub ledger: Ledger,
}

/// Spawn the background persister; returns the sender engines write to.
///
/// The task drains until every sender is dropped, so it never outlives the
/// engines feeding it.
pub fn spawn_persister(store: Arc<dyn StateStore>) -> flume::Sender<PersistRequest> {
    let (tx, rx) = flume::unbounded::<PersistRequest>();
    tokio::spawn(async move {
        while let Ok(request) = rx.recv_async().await {
            if let Err(e) = write_snapshot(store.as_ref(), &request).await {
                warn!(account = %request.account, error = %e, "failed to persist risk state");
            }
        }
    });
    tx
}

async fn write_snapshot(store: &dyn StateStore, request: &PersistRequest) -> Result<()> {
    let policy = serde_json::to_string(&request.policy)?;
    let ledger = serde_json::to_string(&request.ledger)?;
    store.put(&policy_key(&request.account), &policy).await?;
    store.put(&ledger_key(&request.account), &ledger).await?;
    Ok(())
}

/// Load an account's persisted blobs, if any.
pub async fn load_account(
    store: &dyn StateStore,
    account: &AccountId,
) -> Result<(Option<RiskPolicy>, Option<Ledger>)> {
    let policy = match store.get(&policy_key(account)).await? {
        Some(blob) => Some(serde_json::from_str(&blob)?),
        None => None,
    };
    let ledger = match store.get(&ledger_key(account)).await? {
        Some(blob) => Some(serde_json::from_str(&blob)?),
        None => None,
    };
    Ok((policy, ledger))
}

use crate::{
    error::StoreError,
    state::{
        StateStore,
        models::{Checkpoint, Lease, WalEntry},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use model::core::identifiers::RunnerKey;
use sled::IVec;
use std::{path::Path, time::Duration};
use tracing::debug;

pub(crate) const CHECKPOINTS_TREE: &str = "checkpoints";
pub(crate) const SCHEMAS_TREE: &str = "schemas";
const WAL_TREE: &str = "wal";
const LEASES_TREE: &str = "leases";

pub struct SledStateStore {
    db: sled::Db,
    checkpoints: sled::Tree,
    wal: sled::Tree,
    leases: sled::Tree,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Wraps an already opened database so source, target and state share one file lock.
    pub fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            checkpoints: db.open_tree(CHECKPOINTS_TREE)?,
            wal: db.open_tree(WAL_TREE)?,
            leases: db.open_tree(LEASES_TREE)?,
            db,
        })
    }

    #[inline]
    fn wal_prefix(key: &RunnerKey) -> String {
        format!("{}#", key.storage_key())
    }

    fn decode_lease(bytes: &IVec) -> Result<Lease, StoreError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn load_checkpoint(&self, key: &RunnerKey) -> Result<Option<Checkpoint>, StoreError> {
        match self.checkpoints.get(key.storage_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StoreError> {
        // generate_id is monotonic across restarts, so keys sort in append order.
        let seq = self.db.generate_id()?;
        let key = format!("{}#{:020}", entry.runner(), seq);
        let value = bincode::serialize(entry)?;

        self.wal.insert(key, value)?;
        Ok(())
    }

    async fn iter_wal(&self, key: &RunnerKey) -> Result<Vec<WalEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.wal.scan_prefix(Self::wal_prefix(key)) {
            let (_key, value) = item?;
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    async fn acquire_lease(
        &self,
        key: &RunnerKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        let lease_key = key.storage_key();

        loop {
            let now = Utc::now();
            let current = self.leases.get(&lease_key)?;

            let acquired_at = match &current {
                Some(bytes) => {
                    let existing = Self::decode_lease(bytes)?;
                    if existing.owner == owner {
                        existing.acquired_at
                    } else if existing.is_expired(now) {
                        debug!(key = %lease_key, previous = %existing.owner, "Taking over expired lease");
                        now
                    } else {
                        return Err(StoreError::LeaseHeld {
                            key: lease_key,
                            owner: existing.owner,
                        });
                    }
                }
                None => now,
            };

            let lease = Lease {
                owner: owner.to_string(),
                acquired_at,
                renewed_at: now,
                ttl_secs: ttl.as_secs(),
            };
            let encoded = bincode::serialize(&lease)?;

            // Another owner raced us between get and swap; re-evaluate.
            if self
                .leases
                .compare_and_swap(&lease_key, current, Some(encoded))?
                .is_ok()
            {
                self.leases.flush_async().await?;
                return Ok(lease);
            }
        }
    }

    async fn renew_lease(&self, key: &RunnerKey, owner: &str) -> Result<(), StoreError> {
        let lease_key = key.storage_key();

        loop {
            let current = self.leases.get(&lease_key)?;
            let Some(bytes) = &current else {
                return Err(StoreError::Unavailable(format!(
                    "lease '{lease_key}' vanished while held by '{owner}'"
                )));
            };

            let mut lease = Self::decode_lease(bytes)?;
            if lease.owner != owner {
                return Err(StoreError::LeaseHeld {
                    key: lease_key,
                    owner: lease.owner,
                });
            }
            lease.renewed_at = Utc::now();
            let encoded = bincode::serialize(&lease)?;

            if self
                .leases
                .compare_and_swap(&lease_key, current, Some(encoded))?
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    async fn release_lease(&self, key: &RunnerKey, owner: &str) -> Result<(), StoreError> {
        let lease_key = key.storage_key();

        loop {
            let current = self.leases.get(&lease_key)?;
            match &current {
                None => return Ok(()),
                Some(bytes) if Self::decode_lease(bytes)?.owner != owner => return Ok(()),
                Some(_) => {}
            }

            if self
                .leases
                .compare_and_swap(&lease_key, current, None::<IVec>)?
                .is_ok()
            {
                self.leases.flush_async().await?;
                return Ok(());
            }
        }
    }

    async fn current_lease(&self, key: &RunnerKey) -> Result<Option<Lease>, StoreError> {
        match self.leases.get(key.storage_key())? {
            Some(bytes) => Ok(Some(Self::decode_lease(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key() -> RunnerKey {
        RunnerKey::new("runner", "target")
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        let ttl = Duration::from_secs(60);

        store.acquire_lease(&key(), "owner-a", ttl).await.unwrap();

        let err = store
            .acquire_lease(&key(), "owner-b", ttl)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseHeld { ref owner, .. } if owner == "owner-a"));

        // Re-acquiring as the same owner is allowed.
        store.acquire_lease(&key(), "owner-a", ttl).await.unwrap();

        store.release_lease(&key(), "owner-a").await.unwrap();
        let lease = store.acquire_lease(&key(), "owner-b", ttl).await.unwrap();
        assert_eq!(lease.owner, "owner-b");
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        store
            .acquire_lease(&key(), "crashed", Duration::from_secs(0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let lease = store
            .acquire_lease(&key(), "fresh", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(lease.owner, "fresh");
    }

    #[tokio::test]
    async fn renew_rejects_foreign_owner() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        store
            .acquire_lease(&key(), "owner-a", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.renew_lease(&key(), "owner-a").await.is_ok());
        assert!(matches!(
            store.renew_lease(&key(), "owner-b").await,
            Err(StoreError::LeaseHeld { .. })
        ));
    }

    #[tokio::test]
    async fn wal_is_scoped_to_runner_and_ordered() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        let other = RunnerKey::new("other", "target");

        for drained in [false, true] {
            store
                .append_wal(&WalEntry::RunDone {
                    runner: key().storage_key(),
                    drained,
                })
                .await
                .unwrap();
        }
        store
            .append_wal(&WalEntry::Heartbeat {
                runner: other.storage_key(),
                at: Utc::now(),
            })
            .await
            .unwrap();

        let entries = store.iter_wal(&key()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[1], WalEntry::RunDone { drained: true, .. }));
        assert_eq!(store.iter_wal(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_checkpoint_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        assert!(store.load_checkpoint(&key()).await.unwrap().is_none());
    }
}

use crate::{
    error::StoreError,
    state::models::{Checkpoint, Lease, WalEntry},
};
use async_trait::async_trait;
use model::core::identifiers::RunnerKey;
use std::time::Duration;

pub mod models;
pub mod sled_store;

/// Checkpoints, write-ahead log and runner leases.
///
/// Checkpoints are only read here; they advance inside
/// [`TargetStore::conditional_upsert`](crate::connectors::target::TargetStore)
/// so that data and progress commit together.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_checkpoint(&self, key: &RunnerKey) -> Result<Option<Checkpoint>, StoreError>;

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StoreError>;

    async fn iter_wal(&self, key: &RunnerKey) -> Result<Vec<WalEntry>, StoreError>;

    /// Take the exclusive lease for `key`. Succeeds when the lease is free,
    /// already owned by `owner`, or expired.
    async fn acquire_lease(
        &self,
        key: &RunnerKey,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, StoreError>;

    async fn renew_lease(&self, key: &RunnerKey, owner: &str) -> Result<(), StoreError>;

    async fn release_lease(&self, key: &RunnerKey, owner: &str) -> Result<(), StoreError>;

    async fn current_lease(&self, key: &RunnerKey) -> Result<Option<Lease>, StoreError>;
}

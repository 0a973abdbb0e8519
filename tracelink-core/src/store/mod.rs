//! Durable storage for terminal job records.

use async_trait::async_trait;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::job::ResultRecord;

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryResultStore;
pub use redis_store::{RedisResultStore, ResultKeys};

/// Key/value system of record for finished jobs.
///
/// Implementations must be safe under concurrent callers. Writes are
/// unconditional overwrites; the registry guarantees a single writer per
/// fingerprint at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, fingerprint: &Fingerprint, record: &ResultRecord) -> Result<()>;

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResultRecord>>;

    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool>;

    /// Short backend name for diagnostics.
    fn kind(&self) -> &'static str;
}

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::ResultStore;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::job::ResultRecord;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    records: DashMap<Fingerprint, ResultRecord>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a record, as a TTL expiry would.
    pub fn evict(&self, fingerprint: &Fingerprint) -> Option<ResultRecord> {
        self.records.remove(fingerprint).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn put(&self, fingerprint: &Fingerprint, record: &ResultRecord) -> Result<()> {
        debug!(%fingerprint, status = %record.status(), "memory store PUT");
        self.records.insert(fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResultRecord>> {
        Ok(self.records.get(fingerprint).map(|entry| entry.value().clone()))
    }

    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.records.contains_key(fingerprint))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobFailure, JobOutcome, FailureKind};
    use crate::variant::{PipelineVariant, TraceLinkType};
    use crate::fingerprint::FingerprintGenerator;
    use chrono::Utc;

    fn record(fingerprint: &Fingerprint, message: &str) -> ResultRecord {
        ResultRecord {
            fingerprint: fingerprint.clone(),
            project_name: "X".into(),
            variant: PipelineVariant::new(TraceLinkType::SadCode, None),
            outcome: JobOutcome::Failed(JobFailure {
                kind: FailureKind::Analysis,
                message: message.into(),
            }),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_get_exists_and_evict() {
        let store = InMemoryResultStore::new();
        let variant = PipelineVariant::new(TraceLinkType::SadCode, None);
        let fp = FingerprintGenerator::compute("X", &variant, &[b"doc".as_slice()]);

        assert!(!store.exists(&fp).await.unwrap());
        assert!(store.get(&fp).await.unwrap().is_none());

        store.put(&fp, &record(&fp, "first")).await.unwrap();
        store.put(&fp, &record(&fp, "second")).await.unwrap();
        assert!(store.exists(&fp).await.unwrap());
        assert_eq!(store.len(), 1);

        let stored = store.get(&fp).await.unwrap().unwrap();
        match stored.outcome {
            JobOutcome::Failed(failure) => assert_eq!(failure.message, "second"),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!(store.evict(&fp).is_some());
        assert!(!store.exists(&fp).await.unwrap());
        assert!(store.is_empty());
    }
}

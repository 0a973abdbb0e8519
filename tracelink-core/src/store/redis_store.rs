use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::ResultStore;
use crate::error::{JobError, Result};
use crate::fingerprint::Fingerprint;
use crate::job::ResultRecord;

/// Redis-backed result store. Records are JSON strings, optionally with a
/// TTL so old results age out.
#[derive(Clone)]
pub struct RedisResultStore {
    conn: ConnectionManager,
    keys: ResultKeys,
    ttl: Option<Duration>,
}

impl fmt::Debug for RedisResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisResultStore")
            .field("connection", &"ConnectionManager")
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RedisResultStore {
    pub async fn connect(redis_url: &str, namespace: &str, ttl: Option<Duration>) -> Result<Self> {
        info!("Connecting to Redis result store at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            JobError::StoreUnavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| JobError::StoreUnavailable(format!("Failed to connect to Redis: {e}")))?;

        info!("Successfully connected to Redis result store");

        Ok(Self {
            conn,
            keys: ResultKeys::new(namespace),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        })
    }

    pub fn keys(&self) -> &ResultKeys {
        &self.keys
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put(&self, fingerprint: &Fingerprint, record: &ResultRecord) -> Result<()> {
        let key = self.keys.result(fingerprint);
        debug!("Result SET: {} (TTL: {:?})", key, self.ttl);

        let json = serde_json::to_string(record)
            .map_err(|e| JobError::Internal(format!("Failed to serialize result record: {e}")))?;

        let mut conn = self.conn.clone();
        if let Some(ttl) = self.ttl {
            conn.set_ex::<_, _, ()>(&key, json, ttl.as_secs().max(1))
                .await
                .map_err(|e| JobError::StoreUnavailable(format!("Redis SETEX failed: {e}")))?;
        } else {
            conn.set::<_, _, ()>(&key, json)
                .await
                .map_err(|e| JobError::StoreUnavailable(format!("Redis SET failed: {e}")))?;
        }

        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ResultRecord>> {
        let key = self.keys.result(fingerprint);
        debug!("Result GET: {}", key);

        let mut conn = self.conn.clone();
        let data: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| JobError::StoreUnavailable(format!("Redis GET failed: {e}")))?;

        match data {
            Some(json) => {
                let record = decode_record(fingerprint, &json)?;
                debug!("Result HIT: {}", key);
                Ok(Some(record))
            }
            None => {
                debug!("Result MISS: {}", key);
                Ok(None)
            }
        }
    }

    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let key = self.keys.result(fingerprint);
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(&key)
            .await
            .map_err(|e| JobError::StoreUnavailable(format!("Redis EXISTS failed: {e}")))
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

fn decode_record(fingerprint: &Fingerprint, json: &str) -> Result<ResultRecord> {
    let record: ResultRecord =
        serde_json::from_str(json).map_err(|e| JobError::CorruptRecord {
            fingerprint: fingerprint.clone(),
            reason: e.to_string(),
        })?;

    if &record.fingerprint != fingerprint {
        return Err(JobError::CorruptRecord {
            fingerprint: fingerprint.clone(),
            reason: format!("record belongs to {}", record.fingerprint),
        });
    }

    Ok(record)
}

/// Key layout for result records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultKeys {
    namespace: String,
}

impl ResultKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn result(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:result:{}", self.namespace, fingerprint)
    }
}

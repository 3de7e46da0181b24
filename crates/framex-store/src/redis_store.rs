//! Redis-backed job store.
//!
//! Records are stored as JSON under `<prefix><job_id>` with the retention
//! TTL set on every write. Conditional writes run as a Lua script so the
//! version check and the write are a single server-side step.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use framex_models::{Job, JobId};

use crate::error::{StoreError, StoreResult};
use crate::store::{JobStore, StoreConfig};

/// Returns 1 on write, 0 on version mismatch, -1 when the record is gone.
const COMPARE_AND_PUT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
local stored = cjson.decode(current)
local version = tonumber(stored['version']) or 0
if version ~= tonumber(ARGV[1]) then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
return 1
"#;

const SCAN_BATCH: usize = 200;

/// Job store on top of a Redis server.
pub struct RedisJobStore {
    client: redis::Client,
    config: StoreConfig,
    cas_script: redis::Script,
}

impl RedisJobStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            cas_script: redis::Script::new(COMPARE_AND_PUT_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    fn key(&self, id: &JobId) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    fn ttl_secs(&self) -> u64 {
        self.config.retention.as_secs().max(1)
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(self.key(&job.id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl_secs())
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(StoreError::already_exists(&job.id));
        }
        debug!(job_id = %job.id, "Inserted job record");
        Ok(())
    }

    async fn put(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.set_ex::<_, _, ()>(self.key(&job.id), payload, self.ttl_secs())
            .await?;
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.key(id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.config.key_prefix);

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let payloads: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(payloads.len());
        for (key, payload) in keys.iter().zip(payloads) {
            let Some(payload) = payload else {
                continue;
            };
            match serde_json::from_str::<Job>(&payload) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    async fn compare_and_put(&self, job: &Job, expected_version: u64) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        let outcome: i64 = self
            .cas_script
            .key(self.key(&job.id))
            .arg(expected_version)
            .arg(payload)
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(()),
            0 => Err(StoreError::version_conflict(&job.id, expected_version)),
            _ => Err(StoreError::not_found(&job.id)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

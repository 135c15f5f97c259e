//! Redis-backed distributed analysis cache
//!
//! # Key layout
//!
//! ```text
//! {prefix}:{customer}:result:{fingerprint}        → STRING result JSON (PX ttl)
//! {prefix}:{customer}:project:{project}:results   → SET of result keys
//! {prefix}:{customer}:claim:{fingerprint}         → STRING holding job id (NX PX ttl)
//! {prefix}:{customer}:jobs                        → HASH job_id → status JSON
//! {prefix}:{customer}:jobs:expiry                 → ZSET job_id → expiry ms
//! ```
//!
//! A finished job scores `finished_at + ttl`; ongoing jobs score `+inf`.
//! Listing removes every job whose score has passed from both keys. Both
//! registry keys expire once no job of the customer was written for the ttl.

use super::connection::{RedisConfig, RedisPool};
use super::scripts::LuaScripts;
use crate::analysis::{AnalysisResult, JobStatus};
use crate::cache::{CacheKey, DistributedCache};
use crate::error::CacheError;
use crate::types::{current_time_ms, CustomerId, JobId, ProjectId};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Distributed cache shared by every node pointing at the same Redis
pub struct RedisDistributedCache {
    pool: RedisPool,
    scripts: LuaScripts,
    prefix: String,
}

impl RedisDistributedCache {
    /// Connect using `config`
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let prefix = config.key_prefix.clone();
        let pool = RedisPool::new(config).await?;
        Ok(Self::with_pool(pool, prefix))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: RedisPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            scripts: LuaScripts::new(),
            prefix: prefix.into(),
        }
    }

    /// Underlying pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }
}

pub(crate) fn result_key(prefix: &str, key: &CacheKey) -> String {
    format!("{}:{}:result:{}", prefix, key.customer, key.fingerprint)
}

pub(crate) fn project_key(prefix: &str, customer: &CustomerId, project: &ProjectId) -> String {
    format!("{}:{}:project:{}:results", prefix, customer, project)
}

pub(crate) fn claim_key(prefix: &str, key: &CacheKey) -> String {
    format!("{}:{}:claim:{}", prefix, key.customer, key.fingerprint)
}

pub(crate) fn jobs_key(prefix: &str, customer: &CustomerId) -> String {
    format!("{}:{}:jobs", prefix, customer)
}

pub(crate) fn jobs_expiry_key(prefix: &str, customer: &CustomerId) -> String {
    format!("{}:{}:jobs:expiry", prefix, customer)
}

fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Sorted set score after which a job leaves the listing
fn expiry_score(status: &JobStatus, ttl: Duration) -> String {
    match status.finished_at {
        Some(finished) if status.state.is_terminal() => {
            finished.saturating_add(ttl_ms(ttl) as i64).to_string()
        }
        _ => "+inf".to_string(),
    }
}

#[async_trait]
impl DistributedCache for RedisDistributedCache {
    fn backend_id(&self) -> &str {
        "redis"
    }

    async fn get_result(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError> {
        let redis_key = result_key(&self.prefix, key);
        let json: Option<String> = self
            .pool
            .execute("get_result", |mut conn| {
                let redis_key = redis_key.clone();
                async move { redis::cmd("GET").arg(redis_key).query_async(&mut conn).await }
            })
            .await?;

        match json {
            Some(json) => {
                let result = serde_json::from_str(&json)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn put_result(
        &self,
        key: &CacheKey,
        project: &ProjectId,
        result: &AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json =
            serde_json::to_string(result).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let script = self.scripts.put_result();
        let redis_key = result_key(&self.prefix, key);
        let index_key = project_key(&self.prefix, &key.customer, project);

        let _: i32 = self
            .pool
            .execute("put_result", |mut conn| {
                let script = script.clone();
                let redis_key = redis_key.clone();
                let index_key = index_key.clone();
                let json = json.clone();
                async move {
                    script
                        .key(redis_key)
                        .key(index_key)
                        .arg(json)
                        .arg(ttl_ms(ttl))
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;

        debug!(fingerprint = %key.fingerprint, project = %project, "Stored result in Redis");
        Ok(())
    }

    async fn invalidate_project(
        &self,
        customer: &CustomerId,
        project: &ProjectId,
    ) -> Result<usize, CacheError> {
        let script = self.scripts.invalidate_project();
        let index_key = project_key(&self.prefix, customer, project);

        let removed: usize = self
            .pool
            .execute("invalidate_project", |mut conn| {
                let script = script.clone();
                let index_key = index_key.clone();
                async move { script.key(index_key).invoke_async(&mut conn).await }
            })
            .await?;

        debug!(customer = %customer, project = %project, removed, "Invalidated project results in Redis");
        Ok(removed)
    }

    async fn try_claim(&self, key: &CacheKey, job_id: &JobId, ttl: Duration) -> Result<bool, CacheError> {
        let redis_key = claim_key(&self.prefix, key);
        let holder = job_id.to_string();

        let set: Option<String> = self
            .pool
            .execute("try_claim", |mut conn| {
                let redis_key = redis_key.clone();
                let holder = holder.clone();
                async move {
                    redis::cmd("SET")
                        .arg(redis_key)
                        .arg(holder)
                        .arg("NX")
                        .arg("PX")
                        .arg(ttl_ms(ttl))
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;
        if set.is_some() {
            return Ok(true);
        }

        // Re-claiming a fingerprint already held by the same job succeeds
        let current: Option<String> = self
            .pool
            .execute("claim_holder", |mut conn| {
                let redis_key = redis_key.clone();
                async move { redis::cmd("GET").arg(redis_key).query_async(&mut conn).await }
            })
            .await?;
        Ok(current.as_deref() == Some(holder.as_str()))
    }

    async fn release(&self, key: &CacheKey, job_id: &JobId) -> Result<(), CacheError> {
        let script = self.scripts.release_claim();
        let redis_key = claim_key(&self.prefix, key);
        let holder = job_id.to_string();

        let released: i32 = self
            .pool
            .execute("release", |mut conn| {
                let script = script.clone();
                let redis_key = redis_key.clone();
                let holder = holder.clone();
                async move { script.key(redis_key).arg(holder).invoke_async(&mut conn).await }
            })
            .await?;

        if released == 0 {
            warn!(job_id = %job_id, "Claim already expired or taken over");
        }
        Ok(())
    }

    async fn register_job(&self, status: &JobStatus, ttl: Duration) -> Result<(), CacheError> {
        let script = self.scripts.put_job();
        let registry_key = jobs_key(&self.prefix, &status.customer_id);
        let expiry_key = jobs_expiry_key(&self.prefix, &status.customer_id);
        let job_id = status.job_id.to_string();
        let score = expiry_score(status, ttl);
        let json =
            serde_json::to_string(status).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let _: i32 = self
            .pool
            .execute("register_job", |mut conn| {
                let script = script.clone();
                let registry_key = registry_key.clone();
                let expiry_key = expiry_key.clone();
                let job_id = job_id.clone();
                let score = score.clone();
                let json = json.clone();
                async move {
                    script
                        .key(registry_key)
                        .key(expiry_key)
                        .arg(job_id)
                        .arg(json)
                        .arg(score)
                        .arg(ttl_ms(ttl))
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(())
    }

    async fn list_jobs(&self, customer: &CustomerId) -> Result<Vec<JobStatus>, CacheError> {
        let script = self.scripts.list_jobs();
        let registry_key = jobs_key(&self.prefix, customer);
        let expiry_key = jobs_expiry_key(&self.prefix, customer);
        let now = current_time_ms();

        let values: Vec<String> = self
            .pool
            .execute("list_jobs", |mut conn| {
                let script = script.clone();
                let registry_key = registry_key.clone();
                let expiry_key = expiry_key.clone();
                async move {
                    script
                        .key(registry_key)
                        .key(expiry_key)
                        .arg(now)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;

        let mut jobs = Vec::with_capacity(values.len());
        for json in values {
            match serde_json::from_str::<JobStatus>(&json) {
                Ok(status) => jobs.push(status),
                Err(e) => warn!(customer = %customer, "Skipping unreadable job status: {}", e),
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Fingerprint, JobKind, JobState};
    use crate::types::UserContext;

    fn key() -> CacheKey {
        CacheKey::new(CustomerId::new("acme"), Fingerprint("9f86d0".into()))
    }

    #[test]
    fn test_key_layout() {
        let acme = CustomerId::new("acme");
        assert_eq!(result_key("olap", &key()), "olap:acme:result:9f86d0");
        assert_eq!(claim_key("olap", &key()), "olap:acme:claim:9f86d0");
        assert_eq!(
            project_key("olap", &acme, &ProjectId::new("p1")),
            "olap:acme:project:p1:results"
        );
        assert_eq!(jobs_key("olap", &acme), "olap:acme:jobs");
        assert_eq!(jobs_expiry_key("olap", &acme), "olap:acme:jobs:expiry");
    }

    #[test]
    fn test_ttl_never_zero() {
        assert_eq!(ttl_ms(Duration::ZERO), 1);
        assert_eq!(ttl_ms(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_expiry_score_follows_job_ttl() {
        let ctx = UserContext::new("acme", "alice");
        let mut status = JobStatus::pending(
            JobKind::Analysis,
            &ctx,
            ProjectId::new("p1"),
            Fingerprint("f".into()),
        );
        let ttl = Duration::from_secs(90);
        assert_eq!(expiry_score(&status, ttl), "+inf");

        status.finish(JobState::Done);
        let finished = status.finished_at.unwrap();
        assert_eq!(expiry_score(&status, ttl), (finished + 90_000).to_string());
        assert_eq!(
            expiry_score(&status, Duration::from_secs(5)),
            (finished + 5_000).to_string()
        );
    }
}

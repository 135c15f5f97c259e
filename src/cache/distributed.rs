//! Cluster-wide result cache and job registry
//!
//! Every node consults the distributed cache after its local cache. It holds
//! completed results, a claim per fingerprint so only one node computes it,
//! and the status records of jobs so any node can answer a status poll.

use super::local::CacheKey;
use crate::analysis::{AnalysisResult, JobStatus};
use crate::error::CacheError;
use crate::types::{CustomerId, JobId, ProjectId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Shared result cache and job registry
#[async_trait]
pub trait DistributedCache: Send + Sync + 'static {
    /// Unique identifier for this backend
    fn backend_id(&self) -> &str;

    /// Completed result for a key
    async fn get_result(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError>;

    /// Store a completed result computed on `project`
    async fn put_result(
        &self,
        key: &CacheKey,
        project: &ProjectId,
        result: &AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop every result computed on a project; returns how many were dropped
    async fn invalidate_project(
        &self,
        customer: &CustomerId,
        project: &ProjectId,
    ) -> Result<usize, CacheError>;

    /// Claim the computation of a key; false when another job holds the claim
    async fn try_claim(&self, key: &CacheKey, job_id: &JobId, ttl: Duration) -> Result<bool, CacheError>;

    /// Give up a claim held by `job_id`
    async fn release(&self, key: &CacheKey, job_id: &JobId) -> Result<(), CacheError>;

    /// Record a job status
    ///
    /// Terminal jobs are listed for `ttl` after they finish; ongoing jobs
    /// stay listed until they reach a terminal state.
    async fn register_job(&self, status: &JobStatus, ttl: Duration) -> Result<(), CacheError>;

    /// Overwrite a job status after a transition
    async fn update_job(&self, status: &JobStatus, ttl: Duration) -> Result<(), CacheError> {
        self.register_job(status, ttl).await
    }

    /// Every known job of a customer
    async fn list_jobs(&self, customer: &CustomerId) -> Result<Vec<JobStatus>, CacheError>;
}

// =============================================================================
// In-memory backend
// =============================================================================

struct StoredResult {
    result: AnalysisResult,
    project: ProjectId,
    expires: Instant,
}

#[derive(Default)]
struct State {
    results: HashMap<CacheKey, StoredResult>,
    claims: HashMap<CacheKey, (JobId, Instant)>,
    /// Expiry is only set once a job is terminal
    jobs: HashMap<CustomerId, HashMap<JobId, (JobStatus, Option<Instant>)>>,
}

/// Process-local stand-in for the distributed cache
///
/// Share one instance between several services to simulate a cluster.
#[derive(Default)]
pub struct InMemoryDistributedCache {
    state: Mutex<State>,
}

impl InMemoryDistributedCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results
    pub fn result_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .results
            .values()
            .filter(|stored| stored.expires > now)
            .count()
    }
}

#[async_trait]
impl DistributedCache for InMemoryDistributedCache {
    fn backend_id(&self) -> &str {
        "memory"
    }

    async fn get_result(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.results.get(key) {
            Some(stored) if stored.expires > now => Ok(Some(stored.result.clone())),
            Some(_) => {
                state.results.remove(key);
                Ok(None)
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
        self.state.lock().results.insert(
            key.clone(),
            StoredResult {
                result: result.clone(),
                project: project.clone(),
                expires: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_project(
        &self,
        customer: &CustomerId,
        project: &ProjectId,
    ) -> Result<usize, CacheError> {
        let mut state = self.state.lock();
        let before = state.results.len();
        state
            .results
            .retain(|key, stored| !(&key.customer == customer && &stored.project == project));
        Ok(before - state.results.len())
    }

    async fn try_claim(&self, key: &CacheKey, job_id: &JobId, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.claims.get(key) {
            Some((holder, expires)) if *expires > now => Ok(holder == job_id),
            _ => {
                state.claims.insert(key.clone(), (job_id.clone(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &CacheKey, job_id: &JobId) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        if state.claims.get(key).is_some_and(|(holder, _)| holder == job_id) {
            state.claims.remove(key);
        }
        Ok(())
    }

    async fn register_job(&self, status: &JobStatus, ttl: Duration) -> Result<(), CacheError> {
        let expires = status.state.is_terminal().then(|| Instant::now() + ttl);
        self.state
            .lock()
            .jobs
            .entry(status.customer_id.clone())
            .or_default()
            .insert(status.job_id.clone(), (status.clone(), expires));
        Ok(())
    }

    async fn list_jobs(&self, customer: &CustomerId) -> Result<Vec<JobStatus>, CacheError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let Some(jobs) = state.jobs.get_mut(customer) else {
            return Ok(Vec::new());
        };
        jobs.retain(|_, (_, expires)| expires.map_or(true, |at| at > now));
        Ok(jobs.values().map(|(status, _)| status.clone()).collect())
    }
}

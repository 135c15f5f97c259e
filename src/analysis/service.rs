//! Analysis execution with two-level caching and single-flight jobs
//!
//! [`AnalysisService::run`] resolves a request in this order:
//!
//! 1. local result cache
//! 2. distributed result cache (copied into the local cache on hit)
//! 3. a job already running on this node for the same fingerprint
//! 4. a new job: the node that wins the distributed claim computes, the
//!    others follow the distributed cache until the result appears
//!
//! Callers wait up to a timeout and receive the current job status when it
//! expires; the job keeps running and its result lands in the cache.

use super::job::{AnalysisJob, JobKind, JobState, JobStatus};
use super::query::AnalysisRequest;
use super::registry::{JobProgress, JobRegistry, Registration, RunningJob};
use super::result::AnalysisResult;
use crate::cache::{AnalysisCache, CacheKey, DistributedCache};
use crate::engine::AnalysisEngine;
use crate::error::{ComputingError, Error, Result};
use crate::metrics;
use crate::types::{CustomerId, JobId, ProjectId, UserContext};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runtime settings of the analysis service
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long a caller waits before receiving a pending status
    pub default_timeout: Duration,
    /// Lifetime of results in the distributed cache
    pub result_ttl: Duration,
    /// Lifetime of a fingerprint claim
    pub claim_ttl: Duration,
    /// Lifetime of job records in the distributed registry
    pub job_ttl: Duration,
    /// Interval at which followers poll the distributed cache
    pub remote_poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            result_ttl: Duration::from_secs(600),
            claim_ttl: Duration::from_secs(300),
            job_ttl: Duration::from_secs(3600),
            remote_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Overrides [`ExecutorConfig::default_timeout`]
    pub timeout: Option<Duration>,
    /// Only return cached results, never start a computation
    pub lazy: bool,
    /// In lazy mode, report a miss as [`AnalysisOutcome::Empty`]
    pub no_error: bool,
}

impl RunOptions {
    /// Options with a wait timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Lazy options
    pub fn lazy(no_error: bool) -> Self {
        Self {
            lazy: true,
            no_error,
            ..Default::default()
        }
    }
}

/// What a caller gets back from [`AnalysisService::run`]
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// The computed result
    Complete(Arc<AnalysisResult>),
    /// The job is still running; poll its status
    Pending(JobStatus),
    /// Lazy miss with `no_error`
    Empty,
}

impl AnalysisOutcome {
    /// The result, if complete
    pub fn result(&self) -> Option<&Arc<AnalysisResult>> {
        match self {
            AnalysisOutcome::Complete(result) => Some(result),
            _ => None,
        }
    }
}

/// Analysis execution service
pub struct AnalysisService {
    config: ExecutorConfig,
    engine: Arc<dyn AnalysisEngine>,
    local: Arc<AnalysisCache>,
    remote: Arc<dyn DistributedCache>,
    registry: JobRegistry,
}

impl AnalysisService {
    /// Create a service
    pub fn new(
        config: ExecutorConfig,
        engine: Arc<dyn AnalysisEngine>,
        local: Arc<AnalysisCache>,
        remote: Arc<dyn DistributedCache>,
    ) -> Arc<Self> {
        info!(
            engine = engine.engine_id(),
            backend = remote.backend_id(),
            "Analysis service started"
        );
        Arc::new(Self {
            config,
            engine,
            local,
            remote,
            registry: JobRegistry::new(),
        })
    }

    /// Service configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Node-local result cache
    pub fn local_cache(&self) -> &Arc<AnalysisCache> {
        &self.local
    }

    /// Distributed cache
    pub fn remote_cache(&self) -> &Arc<dyn DistributedCache> {
        &self.remote
    }

    /// Jobs running on this node
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Compute a request, or return its cached result
    pub async fn run(
        self: &Arc<Self>,
        ctx: &UserContext,
        request: Arc<AnalysisRequest>,
        options: RunOptions,
    ) -> Result<AnalysisOutcome> {
        let fingerprint = request.fingerprint();
        let project = request.universe.project().id.clone();
        let key = CacheKey::new(ctx.customer_id.clone(), fingerprint.clone());
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);

        if let Some(result) = self.cached(&key, &project).await {
            metrics::record_request("cache_hit");
            debug!(fingerprint = %fingerprint, "Cache hit");
            return Ok(AnalysisOutcome::Complete(result));
        }

        if options.lazy {
            metrics::record_request("lazy_miss");
            debug!(fingerprint = %fingerprint, "Lazy request missed the cache");
            return if options.no_error {
                Ok(AnalysisOutcome::Empty)
            } else {
                Err(Error::NotInCache(fingerprint.to_string()))
            };
        }

        let registration = self.registry.register(key.clone(), || {
            JobStatus::pending(JobKind::Analysis, ctx, project.clone(), fingerprint.clone())
        });
        let job = match registration {
            Registration::Existing(job) => {
                metrics::record_request("attached");
                debug!(job_id = %job.job_id(), "Attached to running job");
                return self.attach(&job, timeout).await;
            }
            Registration::New(job) => job,
        };

        let status = job.status();
        metrics::record_request("submitted");
        info!(
            job_id = %status.job_id,
            customer = %status.customer_id,
            project = %status.project_id,
            fingerprint = %fingerprint,
            "Analysis job submitted"
        );
        if let Err(e) = self.remote.register_job(&status, self.config.job_ttl).await {
            warn!(job_id = %status.job_id, "Failed to publish job status: {}", e);
        }

        let claimed = match self
            .remote
            .try_claim(&key, &status.job_id, self.config.claim_ttl)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(job_id = %status.job_id, "Claim failed, computing locally: {}", e);
                true
            }
        };

        let service = Arc::clone(self);
        let runner = job.clone();
        if claimed {
            tokio::spawn(async move { service.execute(runner, request).await });
        } else {
            debug!(job_id = %status.job_id, "Fingerprint claimed by another node, following");
            tokio::spawn(async move { service.follow(runner, request).await });
        }

        self.attach(&job, timeout).await
    }

    /// Request cancellation of a job running on this node
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.registry.by_job(job_id) {
            Some(job) => {
                info!(job_id = %job_id, "Cancellation requested");
                job.cancel();
                true
            }
            None => false,
        }
    }

    /// Status of a job known locally or to the distributed registry
    pub async fn job_status(&self, customer: &CustomerId, job_id: &JobId) -> Option<JobStatus> {
        if let Some(job) = self.registry.by_job(job_id) {
            return Some(job.status());
        }
        match self.remote.list_jobs(customer).await {
            Ok(jobs) => jobs.into_iter().find(|job| &job.job_id == job_id),
            Err(e) => {
                warn!(customer = %customer, "Distributed job lookup failed: {}", e);
                None
            }
        }
    }

    /// Ongoing analysis jobs of a customer across the cluster
    pub async fn ongoing(&self, customer: &CustomerId) -> Vec<JobStatus> {
        let mut jobs: Vec<JobStatus> = self
            .registry
            .list(customer)
            .into_iter()
            .filter(JobStatus::is_ongoing)
            .collect();
        let mut seen: HashSet<JobId> = jobs.iter().map(|job| job.job_id.clone()).collect();

        match self.remote.list_jobs(customer).await {
            Ok(remote) => {
                for job in remote {
                    if job.is_ongoing() && seen.insert(job.job_id.clone()) {
                        jobs.push(job);
                    }
                }
            }
            Err(e) => warn!(customer = %customer, "Distributed job listing failed: {}", e),
        }

        jobs.sort_by_key(|job| job.submitted_at);
        jobs
    }

    /// Drop cached results of a project, locally and in the distributed cache
    ///
    /// Returns how many local entries were removed.
    pub async fn invalidate_project(&self, customer: &CustomerId, project: &ProjectId) -> usize {
        let local = self.local.invalidate_project(customer, project);
        match self.remote.invalidate_project(customer, project).await {
            Ok(remote) => info!(
                customer = %customer,
                project = %project,
                local,
                remote,
                "Project results invalidated"
            ),
            Err(e) => warn!(
                customer = %customer,
                project = %project,
                "Distributed invalidation failed: {}", e
            ),
        }
        local
    }

    async fn attach(&self, job: &RunningJob, timeout: Duration) -> Result<AnalysisOutcome> {
        let mut rx = job.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|p| p.status.state.is_terminal())
                .await
                .map(|progress| progress.clone())
        })
        .await;

        match waited {
            Ok(Ok(progress)) => outcome_of(progress),
            Ok(Err(_)) => Err(ComputingError::Execution(format!(
                "job {} stopped publishing progress",
                job.job_id()
            ))
            .into()),
            Err(_) => {
                let status = job.status();
                debug!(job_id = %status.job_id, state = status.state.label(), "Wait timed out");
                Ok(AnalysisOutcome::Pending(status))
            }
        }
    }

    async fn execute(self: Arc<Self>, job: Arc<RunningJob>, request: Arc<AnalysisRequest>) {
        let mut status = job.status();

        // another job may have stored the result since this one was registered
        if let Some(result) = self.cached(job.key(), &status.project_id).await {
            debug!(job_id = %status.job_id, "Result cached before computing");
            status.finish(JobState::Done);
            self.finish(&job, status, Some(result)).await;
            self.release_claim(&job).await;
            return;
        }

        status.start();
        job.publish(status.clone(), None);
        self.publish_remote(&status).await;

        metrics::JOBS_IN_FLIGHT.inc();
        let timer = Instant::now();
        let analysis = AnalysisJob {
            status: status.clone(),
            request: request.clone(),
        };

        let engine = Arc::clone(&self.engine);
        let mut computation = tokio::spawn(async move { engine.compute(&analysis).await });
        let joined = tokio::select! {
            biased;
            _ = job.cancelled() => None,
            joined = &mut computation => Some(joined),
        };
        if joined.is_none() {
            computation.abort();
        }
        let computed = joined.map(|joined| joined.unwrap_or_else(|e| Err(join_failure(e))));
        metrics::JOBS_IN_FLIGHT.dec();
        let elapsed = timer.elapsed();

        let mut result = None;
        match computed {
            Some(Ok(computed)) => {
                let computed = Arc::new(computed);
                self.store(job.key(), &status.project_id, &computed).await;
                metrics::record_execution(elapsed.as_secs_f64(), true);
                info!(job_id = %status.job_id, rows = computed.total_rows, ?elapsed, "Analysis job done");
                status.finish(JobState::Done);
                result = Some(computed);
            }
            Some(Err(e)) if e.is_interrupted() => {
                info!(job_id = %status.job_id, "Analysis job interrupted by engine");
                status.finish(JobState::Interrupted);
            }
            Some(Err(e)) => {
                metrics::record_execution(elapsed.as_secs_f64(), false);
                warn!(job_id = %status.job_id, "Analysis job failed: {}", e);
                status.finish(JobState::Error(e.to_string()));
            }
            None => {
                info!(job_id = %status.job_id, "Analysis job cancelled");
                status.finish(JobState::Interrupted);
            }
        }

        self.finish(&job, status, result).await;
        self.release_claim(&job).await;
    }

    /// Wait for another node to publish the result of a claimed fingerprint
    ///
    /// Takes over the computation if the claim is released or expires
    /// without a result.
    async fn follow(self: Arc<Self>, job: Arc<RunningJob>, request: Arc<AnalysisRequest>) {
        let mut status = job.status();
        let deadline = Instant::now() + self.config.claim_ttl;

        loop {
            tokio::select! {
                biased;
                _ = job.cancelled() => {
                    status.finish(JobState::Interrupted);
                    break;
                }
                _ = tokio::time::sleep(self.config.remote_poll_interval) => {}
            }

            if let Some(result) = self.cached(job.key(), &status.project_id).await {
                status.finish(JobState::Done);
                return self.finish(&job, status, Some(result)).await;
            }

            match self
                .remote
                .try_claim(job.key(), &status.job_id, self.config.claim_ttl)
                .await
            {
                Ok(true) => {
                    info!(job_id = %status.job_id, "Claim released without result, computing");
                    return self.execute(job, request).await;
                }
                Ok(false) => {}
                Err(e) => warn!(job_id = %status.job_id, "Claim retry failed: {}", e),
            }

            if Instant::now() >= deadline {
                status.finish(JobState::Error(
                    "remote computation did not complete in time".to_string(),
                ));
                break;
            }
        }

        self.finish(&job, status, None).await;
    }

    /// Result from the local cache, else from the distributed cache
    ///
    /// Distributed hits are copied into the local cache.
    async fn cached(&self, key: &CacheKey, project: &ProjectId) -> Option<Arc<AnalysisResult>> {
        if let Some(result) = self.local.get(key) {
            metrics::record_cache_lookup("local", true);
            return Some(result);
        }
        metrics::record_cache_lookup("local", false);

        match self.remote.get_result(key).await {
            Ok(Some(result)) => {
                metrics::record_cache_lookup("remote", true);
                let result = Arc::new(result);
                self.local.put(key.clone(), project.clone(), result.clone());
                Some(result)
            }
            Ok(None) => {
                metrics::record_cache_lookup("remote", false);
                None
            }
            Err(e) => {
                warn!(fingerprint = %key.fingerprint, "Distributed cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Publish the terminal status of a job and forget it
    async fn finish(&self, job: &RunningJob, status: JobStatus, result: Option<Arc<AnalysisResult>>) {
        job.publish(status.clone(), result);
        self.registry.remove(job.key(), &status.job_id);
        self.publish_remote(&status).await;
    }

    async fn release_claim(&self, job: &RunningJob) {
        let job_id = job.job_id();
        if let Err(e) = self.remote.release(job.key(), &job_id).await {
            warn!(job_id = %job_id, "Failed to release claim: {}", e);
        }
    }

    async fn store(&self, key: &CacheKey, project: &ProjectId, result: &Arc<AnalysisResult>) {
        self.local.put(key.clone(), project.clone(), result.clone());
        if let Err(e) = self
            .remote
            .put_result(key, project, result, self.config.result_ttl)
            .await
        {
            warn!(fingerprint = %key.fingerprint, "Failed to store result remotely: {}", e);
        }
    }

    async fn publish_remote(&self, status: &JobStatus) {
        if let Err(e) = self.remote.update_job(status, self.config.job_ttl).await {
            warn!(job_id = %status.job_id, "Failed to publish job status: {}", e);
        }
    }
}

fn join_failure(e: tokio::task::JoinError) -> Error {
    if e.is_panic() {
        ComputingError::Execution("analysis engine panicked".to_string()).into()
    } else {
        Error::Interrupted("analysis computation was aborted".to_string())
    }
}

fn outcome_of(progress: JobProgress) -> Result<AnalysisOutcome> {
    match (progress.status.state, progress.result) {
        (JobState::Done, Some(result)) => Ok(AnalysisOutcome::Complete(result)),
        (JobState::Done, None) => Err(ComputingError::Execution(format!(
            "job {} finished without a result",
            progress.status.job_id
        ))
        .into()),
        (JobState::Error(message), _) => Err(ComputingError::Execution(message).into()),
        (JobState::Interrupted, _) => Err(Error::Interrupted(format!(
            "job {} was cancelled",
            progress.status.job_id
        ))),
        (state, _) => Err(ComputingError::Execution(format!(
            "job {} is still {}",
            progress.status.job_id,
            state.label()
        ))
        .into()),
    }
}

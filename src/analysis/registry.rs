//! In-flight analysis jobs of this node
//!
//! At most one job runs per cache key. A second submission of the same
//! fingerprint finds the running job through [`JobRegistry::register`] and
//! subscribes to its progress instead of starting another computation.

use super::job::JobStatus;
use super::result::AnalysisResult;
use crate::cache::CacheKey;
use crate::types::{CustomerId, JobId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Latest published state of a job
#[derive(Debug, Clone)]
pub struct JobProgress {
    /// Current status
    pub status: JobStatus,
    /// Result, set together with the `Done` state
    pub result: Option<Arc<AnalysisResult>>,
}

/// A job registered on this node
pub struct RunningJob {
    key: CacheKey,
    progress: watch::Sender<JobProgress>,
    cancel: Notify,
}

impl RunningJob {
    fn new(key: CacheKey, status: JobStatus) -> Self {
        let (progress, _) = watch::channel(JobProgress {
            status,
            result: None,
        });
        Self {
            key,
            progress,
            cancel: Notify::new(),
        }
    }

    /// Cache key computed by this job
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Job id
    pub fn job_id(&self) -> JobId {
        self.progress.borrow().status.job_id.clone()
    }

    /// Snapshot of the current status
    pub fn status(&self) -> JobStatus {
        self.progress.borrow().status.clone()
    }

    /// Receiver notified at every transition
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.subscribe()
    }

    /// Publish a transition to every waiter
    pub fn publish(&self, status: JobStatus, result: Option<Arc<AnalysisResult>>) {
        self.progress.send_replace(JobProgress { status, result });
    }

    /// Ask the executing task to stop
    ///
    /// The request is remembered if the task is not awaiting it yet.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    /// Resolves once [`RunningJob::cancel`] has been called
    pub async fn cancelled(&self) {
        self.cancel.notified().await;
    }
}

/// Outcome of [`JobRegistry::register`]
pub enum Registration {
    /// No job was running for the key; the caller owns the execution
    New(Arc<RunningJob>),
    /// A job is already running for the key
    Existing(Arc<RunningJob>),
}

/// Running jobs indexed by cache key and job id
#[derive(Default)]
pub struct JobRegistry {
    by_key: DashMap<CacheKey, Arc<RunningJob>>,
    by_id: DashMap<JobId, CacheKey>,
}

impl JobRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job for `key` unless one is already running
    ///
    /// `status` is only invoked when a new job is created.
    pub fn register(&self, key: CacheKey, status: impl FnOnce() -> JobStatus) -> Registration {
        match self.by_key.entry(key) {
            Entry::Occupied(entry) => Registration::Existing(entry.get().clone()),
            Entry::Vacant(entry) => {
                let job = Arc::new(RunningJob::new(entry.key().clone(), status()));
                self.by_id.insert(job.job_id(), entry.key().clone());
                entry.insert(job.clone());
                Registration::New(job)
            }
        }
    }

    /// Running job for a key
    pub fn get(&self, key: &CacheKey) -> Option<Arc<RunningJob>> {
        self.by_key.get(key).map(|job| job.clone())
    }

    /// Running job by id
    pub fn by_job(&self, job_id: &JobId) -> Option<Arc<RunningJob>> {
        let key = self.by_id.get(job_id)?.clone();
        self.get(&key)
    }

    /// Drop the job `job_id` from the registry
    ///
    /// A newer job registered under the same key is left in place.
    pub fn remove(&self, key: &CacheKey, job_id: &JobId) {
        self.by_key.remove_if(key, |_, job| &job.job_id() == job_id);
        self.by_id.remove(job_id);
    }

    /// Statuses of every registered job of a customer
    pub fn list(&self, customer: &CustomerId) -> Vec<JobStatus> {
        self.by_key
            .iter()
            .filter(|entry| &entry.key().customer == customer)
            .map(|entry| entry.value().status())
            .collect()
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// True when no job is registered
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Fingerprint, JobKind, JobState};
    use crate::types::{ProjectId, UserContext};
    use std::time::Duration;

    fn key(customer: &str) -> CacheKey {
        CacheKey::new(CustomerId::new(customer), Fingerprint("f".into()))
    }

    fn pending(customer: &str) -> JobStatus {
        JobStatus::pending(
            JobKind::Analysis,
            &UserContext::new(customer, "alice"),
            ProjectId::new("p1"),
            Fingerprint("f".into()),
        )
    }

    #[test]
    fn test_second_registration_attaches() {
        let registry = JobRegistry::new();
        let first = match registry.register(key("acme"), || pending("acme")) {
            Registration::New(job) => job,
            Registration::Existing(_) => panic!("expected a new job"),
        };
        match registry.register(key("acme"), || panic!("status built for an attached job")) {
            Registration::Existing(job) => assert_eq!(job.job_id(), first.job_id()),
            Registration::New(_) => panic!("expected the running job"),
        }
        assert_eq!(registry.len(), 1);
        assert!(registry.by_job(&first.job_id()).is_some());
    }

    #[test]
    fn test_remove_ignores_newer_job() {
        let registry = JobRegistry::new();
        let Registration::New(old) = registry.register(key("acme"), || pending("acme")) else {
            panic!("expected a new job");
        };
        registry.remove(&key("acme"), &old.job_id());
        let Registration::New(new) = registry.register(key("acme"), || pending("acme")) else {
            panic!("expected a new job");
        };

        registry.remove(&key("acme"), &old.job_id());
        assert_eq!(registry.get(&key("acme")).map(|j| j.job_id()), Some(new.job_id()));
    }

    #[test]
    fn test_list_is_per_customer() {
        let registry = JobRegistry::new();
        registry.register(key("acme"), || pending("acme"));
        registry.register(key("globex"), || pending("globex"));
        let listed = registry.list(&CustomerId::new("acme"));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].customer_id, CustomerId::new("acme"));
    }

    #[tokio::test]
    async fn test_waiters_see_terminal_state() {
        let registry = JobRegistry::new();
        let Registration::New(job) = registry.register(key("acme"), || pending("acme")) else {
            panic!("expected a new job");
        };
        let mut rx = job.subscribe();

        let publisher = job.clone();
        tokio::spawn(async move {
            let mut status = publisher.status();
            status.start();
            publisher.publish(status.clone(), None);
            status.finish(JobState::Interrupted);
            publisher.publish(status, None);
        });

        let progress = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|p| p.status.state.is_terminal()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(progress.status.state, JobState::Interrupted);
    }

    #[tokio::test]
    async fn test_cancel_before_wait_is_remembered() {
        let registry = JobRegistry::new();
        let Registration::New(job) = registry.register(key("acme"), || pending("acme")) else {
            panic!("expected a new job");
        };
        job.cancel();
        tokio::time::timeout(Duration::from_secs(1), job.cancelled())
            .await
            .unwrap();
    }
}

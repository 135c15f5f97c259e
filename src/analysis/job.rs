//! Job status records
//!
//! A status is created when a job is submitted, mutated only by the task
//! executing it, and published to local waiters and to the distributed
//! registry at every transition.

use super::query::{AnalysisRequest, Fingerprint};
use crate::types::{current_time_ms, CustomerId, JobId, ProjectId, UserContext, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a tracked job computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Analysis execution
    Analysis,
    /// Domain hierarchy construction
    Hierarchy,
}

/// Job lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Registered, not started
    Pending,
    /// Executing
    Running,
    /// Finished with a result
    Done,
    /// Finished with an error
    Error(String),
    /// Cancelled before completion
    Interrupted,
}

impl JobState {
    /// True once the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error(_) | JobState::Interrupted)
    }

    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Error(_) => "error",
            JobState::Interrupted => "interrupted",
        }
    }
}

/// Status record of a tracked job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job identifier
    pub job_id: JobId,
    /// What the job computes
    pub kind: JobKind,
    /// Owning tenant
    pub customer_id: CustomerId,
    /// Submitting user
    pub user_id: UserId,
    /// Target project
    pub project_id: ProjectId,
    /// Fingerprint of the computed request
    pub fingerprint: Fingerprint,
    /// Current state
    pub state: JobState,
    /// Submission time (ms since epoch)
    pub submitted_at: i64,
    /// Execution start time
    pub started_at: Option<i64>,
    /// Completion time
    pub finished_at: Option<i64>,
}

impl JobStatus {
    /// New pending status under a fresh job id
    pub fn pending(
        kind: JobKind,
        ctx: &UserContext,
        project_id: ProjectId,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            kind,
            customer_id: ctx.customer_id.clone(),
            user_id: ctx.user_id.clone(),
            project_id,
            fingerprint,
            state: JobState::Pending,
            submitted_at: current_time_ms(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `Running`
    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(current_time_ms());
    }

    /// Move to a terminal state
    pub fn finish(&mut self, state: JobState) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.finished_at = Some(current_time_ms());
    }

    /// Still pending or running
    pub fn is_ongoing(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// A job handed to the execution backend
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    /// Status at dispatch time
    pub status: JobStatus,
    /// The resolved request
    pub request: Arc<AnalysisRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let ctx = UserContext::new("acme", "alice");
        let mut status = JobStatus::pending(
            JobKind::Analysis,
            &ctx,
            ProjectId::new("p1"),
            Fingerprint("abc".into()),
        );
        assert!(status.is_ongoing());
        assert_eq!(status.state.label(), "pending");

        status.start();
        assert!(status.started_at.is_some());
        assert!(status.is_ongoing());

        status.finish(JobState::Error("boom".into()));
        assert!(!status.is_ongoing());
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_status_serde() {
        let ctx = UserContext::new("acme", "alice");
        let status = JobStatus::pending(
            JobKind::Hierarchy,
            &ctx,
            ProjectId::new("p1"),
            Fingerprint("abc".into()),
        );
        let json = serde_json::to_string(&status).unwrap();
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}

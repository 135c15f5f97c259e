//! Job status polling
//!
//! Callers see a job when they hold `Write` on its project, or `Read` and
//! submitted it themselves. Everything else is left out of the reply
//! without an error, including jobs whose project cannot be looked up.

use crate::analysis::{AnalysisService, JobStatus};
use crate::engine::{AccessRights, ProjectCatalog};
use crate::hierarchy::HierarchyManager;
use crate::model::Project;
use crate::types::{JobId, Role, UserContext};
use std::sync::Arc;
use tracing::debug;

/// Status lookups filtered by access rights
pub struct JobStatusService {
    analysis: Arc<AnalysisService>,
    hierarchies: Arc<HierarchyManager>,
    projects: Arc<dyn ProjectCatalog>,
    rights: Arc<dyn AccessRights>,
}

impl JobStatusService {
    /// Create the service
    pub fn new(
        analysis: Arc<AnalysisService>,
        hierarchies: Arc<HierarchyManager>,
        projects: Arc<dyn ProjectCatalog>,
        rights: Arc<dyn AccessRights>,
    ) -> Self {
        Self {
            analysis,
            hierarchies,
            projects,
            rights,
        }
    }

    /// Status of one job, if it exists and the caller may see it
    pub async fn status(&self, ctx: &UserContext, job_id: &JobId) -> Option<JobStatus> {
        let status = match self.analysis.job_status(&ctx.customer_id, job_id).await {
            Some(status) => status,
            None => self
                .hierarchies
                .ongoing_jobs(&ctx.customer_id)
                .into_iter()
                .find(|job| &job.job_id == job_id)?,
        };
        self.visible(ctx, &status).then_some(status)
    }

    /// Ongoing analysis and hierarchy jobs visible to the caller
    pub async fn list(&self, ctx: &UserContext) -> Vec<JobStatus> {
        let mut jobs = self.analysis.ongoing(&ctx.customer_id).await;
        jobs.extend(self.hierarchies.ongoing_jobs(&ctx.customer_id));
        jobs.retain(|job| self.visible(ctx, job));
        jobs
    }

    fn visible(&self, ctx: &UserContext, job: &JobStatus) -> bool {
        if job.customer_id != ctx.customer_id {
            return false;
        }
        match self.projects.project(&ctx.customer_id, &job.project_id) {
            Ok(project) => check_acl(self.rights.as_ref(), ctx, &project, job),
            Err(e) => {
                debug!(job_id = %job.job_id, "Skipping job of unknown project: {}", e);
                false
            }
        }
    }
}

/// Whether `ctx` may see `job` on `project`
pub fn check_acl(rights: &dyn AccessRights, ctx: &UserContext, project: &Project, job: &JobStatus) -> bool {
    if rights.has_role(ctx, project, Role::Write) {
        return true;
    }
    rights.has_role(ctx, project, Role::Read) && job.user_id == ctx.user_id
}

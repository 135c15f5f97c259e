//! Collaborator interfaces consumed by the semantic layer
//!
//! Metadata, statistics, access rights, member materialization and
//! relational execution are owned by other services. Each is a trait here so
//! deployments can plug in their own backend and tests can use the in-memory
//! implementations from [`crate::engine::memory`].

use crate::analysis::{AnalysisJob, AnalysisResult};
use crate::error::{ComputingError, Result, ScopeError};
use crate::expression::Expression;
use crate::hierarchy::DimensionMember;
use crate::model::{Attribute, Dimension, Domain, Project, Relation};
use crate::types::{CustomerId, DomainId, ProjectId, Role, UserContext};
use async_trait::async_trait;

// =============================================================================
// Metadata
// =============================================================================

/// Turns a dimension's declared definition into an expression
pub trait ExpressionParser: Send + Sync + 'static {
    /// Parse `dimension` in the scope of `domain`
    fn parse(&self, domain: &Domain, dimension: &Dimension) -> std::result::Result<Expression, ScopeError>;
}

/// Read access to domains, dimensions and relations of a project
pub trait DimensionCatalog: Send + Sync + 'static {
    /// Look up a domain by id
    fn domain(&self, project: &ProjectId, domain: &DomainId) -> Option<Domain>;

    /// Every dimension declared on a domain
    fn dimensions(&self, domain: &Domain) -> Vec<Dimension>;

    /// Dimensions whose parent is `dimension`
    fn sub_dimensions(&self, dimension: &Dimension) -> std::result::Result<Vec<Dimension>, ScopeError>;

    /// Attributes declared on a dimension
    fn attributes(&self, dimension: &Dimension) -> Vec<Attribute>;

    /// Relations leaving a domain
    fn relations(&self, domain: &Domain) -> Vec<Relation>;
}

/// Project lookup scoped by tenant
pub trait ProjectCatalog: Send + Sync + 'static {
    /// Fetch a project, failing when it does not belong to `customer`
    fn project(&self, customer: &CustomerId, project: &ProjectId) -> std::result::Result<Project, ScopeError>;
}

/// Role checks against a project
pub trait AccessRights: Send + Sync + 'static {
    /// True when `user` holds at least `role` on `project`
    fn has_role(&self, user: &UserContext, project: &Project, role: Role) -> bool;
}

// =============================================================================
// Computation
// =============================================================================

/// Cardinality estimates, possibly backed by live database queries
pub trait StatisticsService: Send + Sync + 'static {
    /// Estimate for `expression`; negative means no estimate is available
    fn compute_statistics(&self, project: &ProjectId, expression: &Expression) -> Result<f32>;
}

/// Materializes the member set of a dimension
pub trait MemberSource: Send + Sync + 'static {
    /// Read every member of `dimension` on `domain`
    fn read_members(
        &self,
        project: &ProjectId,
        domain: &Domain,
        dimension: &Dimension,
    ) -> std::result::Result<Vec<DimensionMember>, ComputingError>;
}

/// Relational execution backend for analyses
#[async_trait]
pub trait AnalysisEngine: Send + Sync + 'static {
    /// Unique identifier for this backend
    fn engine_id(&self) -> &str;

    /// Execute a resolved analysis
    async fn compute(&self, job: &AnalysisJob) -> Result<AnalysisResult>;
}

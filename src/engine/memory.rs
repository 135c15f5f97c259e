//! In-memory implementations of the collaborator traits
//!
//! These are intended for:
//! - **Unit and integration testing** without a metadata store or database
//! - **Single-node development** where the catalog fits in memory
//!
//! # Warning
//!
//! Everything here lives in process memory and is lost on restart. The
//! statistics and member sources can be told to fail or to stall, which is
//! how tests exercise degraded paths.

use crate::analysis::{AnalysisJob, AnalysisResult};
use crate::engine::traits::{
    AccessRights, AnalysisEngine, DimensionCatalog, MemberSource, ProjectCatalog,
    StatisticsService,
};
use crate::error::{ComputingError, Error, Result, ScopeError};
use crate::expression::Expression;
use crate::hierarchy::DimensionMember;
use crate::model::{Attribute, Dimension, Domain, Project, Relation};
use crate::types::{current_time_ms, CustomerId, DomainId, ProjectId, Role, UserContext, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// =============================================================================
// Catalog
// =============================================================================

/// Metadata catalog backed by hash maps
#[derive(Default)]
pub struct InMemoryCatalog {
    projects: RwLock<HashMap<(CustomerId, ProjectId), Project>>,
    domains: RwLock<HashMap<(ProjectId, DomainId), Domain>>,
    dimensions: RwLock<HashMap<(ProjectId, DomainId), Vec<Dimension>>>,
    relations: RwLock<Vec<Relation>>,
    attributes: RwLock<HashMap<String, Vec<Attribute>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project
    pub fn add_project(&self, project: Project) {
        self.projects
            .write()
            .insert((project.customer_id.clone(), project.id.clone()), project);
    }

    /// Register a domain
    pub fn add_domain(&self, domain: Domain) {
        self.domains
            .write()
            .insert((domain.project_id.clone(), domain.id.clone()), domain);
    }

    /// Register a dimension on its domain
    pub fn add_dimension(&self, dimension: Dimension) {
        let key = (dimension.id.project_id.clone(), dimension.id.domain_id.clone());
        self.dimensions.write().entry(key).or_default().push(dimension);
    }

    /// Register a relation
    pub fn add_relation(&self, relation: Relation) {
        self.relations.write().push(relation);
    }

    /// Attach an attribute to a persisted dimension
    pub fn add_attribute(&self, dimension: &Dimension, attribute: Attribute) {
        self.attributes
            .write()
            .entry(dimension.oid().to_string())
            .or_default()
            .push(attribute);
    }
}

impl DimensionCatalog for InMemoryCatalog {
    fn domain(&self, project: &ProjectId, domain: &DomainId) -> Option<Domain> {
        self.domains
            .read()
            .get(&(project.clone(), domain.clone()))
            .cloned()
    }

    fn dimensions(&self, domain: &Domain) -> Vec<Dimension> {
        self.dimensions
            .read()
            .get(&(domain.project_id.clone(), domain.id.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn sub_dimensions(&self, dimension: &Dimension) -> std::result::Result<Vec<Dimension>, ScopeError> {
        let Some(oid) = dimension.id.dimension_id.as_deref() else {
            return Ok(Vec::new());
        };
        let key = (dimension.id.project_id.clone(), dimension.id.domain_id.clone());
        let dimensions = self.dimensions.read();
        let siblings = dimensions.get(&key).ok_or_else(|| {
            ScopeError::NotFound(format!("domain '{}'", dimension.id.domain_id))
        })?;
        Ok(siblings
            .iter()
            .filter(|d| d.parent_id.as_deref() == Some(oid))
            .cloned()
            .collect())
    }

    fn attributes(&self, dimension: &Dimension) -> Vec<Attribute> {
        self.attributes
            .read()
            .get(dimension.oid())
            .cloned()
            .unwrap_or_default()
    }

    fn relations(&self, domain: &Domain) -> Vec<Relation> {
        self.relations
            .read()
            .iter()
            .filter(|r| r.left == domain.id)
            .cloned()
            .collect()
    }
}

impl ProjectCatalog for InMemoryCatalog {
    fn project(&self, customer: &CustomerId, project: &ProjectId) -> std::result::Result<Project, ScopeError> {
        self.projects
            .read()
            .get(&(customer.clone(), project.clone()))
            .cloned()
            .ok_or_else(|| ScopeError::NotFound(format!("project '{}'", project)))
    }
}

// =============================================================================
// Access rights
// =============================================================================

/// Explicit role grants; WRITE implies READ
#[derive(Default)]
pub struct StaticAccessRights {
    grants: RwLock<HashMap<(UserId, ProjectId), Role>>,
}

impl StaticAccessRights {
    /// Create an empty grant table
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` on `project` to `user`
    pub fn grant(&self, user: impl Into<UserId>, project: impl Into<ProjectId>, role: Role) {
        self.grants.write().insert((user.into(), project.into()), role);
    }
}

impl AccessRights for StaticAccessRights {
    fn has_role(&self, user: &UserContext, project: &Project, role: Role) -> bool {
        self.grants
            .read()
            .get(&(user.user_id.clone(), project.id.clone()))
            .is_some_and(|granted| *granted >= role)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics keyed by the pretty-printed expression
///
/// Unknown expressions yield `-1.0`. When a failure is configured every call
/// returns a statistics error.
#[derive(Default)]
pub struct FixedStatistics {
    estimates: RwLock<HashMap<String, f32>>,
    failure: RwLock<Option<String>>,
    calls: AtomicUsize,
}

impl FixedStatistics {
    /// Create a source with no estimates
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the estimate for an expression
    pub fn set_estimate(&self, expression: &Expression, estimate: f32) {
        self.estimates.write().insert(expression.pretty_print(), estimate);
    }

    /// Make every following call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.write() = Some(message.to_string());
    }

    /// Number of calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl StatisticsService for FixedStatistics {
    fn compute_statistics(&self, _project: &ProjectId, expression: &Expression) -> Result<f32> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = self.failure.read().as_ref() {
            return Err(ComputingError::Statistics(message.clone()).into());
        }
        Ok(self
            .estimates
            .read()
            .get(&expression.pretty_print())
            .copied()
            .unwrap_or(-1.0))
    }
}

// =============================================================================
// Members
// =============================================================================

/// Member sets keyed by dimension oid
#[derive(Default)]
pub struct InMemoryMemberSource {
    members: RwLock<HashMap<String, Vec<DimensionMember>>>,
    failing: RwLock<HashSet<String>>,
    delay: RwLock<Option<Duration>>,
    reads: AtomicUsize,
}

impl InMemoryMemberSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the members of a dimension
    pub fn set_members(&self, dimension: &Dimension, members: Vec<DimensionMember>) {
        self.members
            .write()
            .insert(dimension.oid().to_string(), members);
    }

    /// Make reads of `dimension` fail
    pub fn fail_on(&self, dimension: &Dimension) {
        self.failing.write().insert(dimension.oid().to_string());
    }

    /// Stall every read by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Number of reads served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl MemberSource for InMemoryMemberSource {
    fn read_members(
        &self,
        _project: &ProjectId,
        _domain: &Domain,
        dimension: &Dimension,
    ) -> std::result::Result<Vec<DimensionMember>, ComputingError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.failing.read().contains(dimension.oid()) {
            return Err(ComputingError::Index(format!(
                "unable to read members of '{}'",
                dimension.name
            )));
        }
        Ok(self
            .members
            .read()
            .get(dimension.oid())
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Analysis engine
// =============================================================================

/// Engine returning fixed rows, labelled after the request's group-by axes
///
/// Counts executions so single-flight behavior can be asserted.
#[derive(Default)]
pub struct MemoryAnalysisEngine {
    rows: RwLock<Vec<Vec<serde_json::Value>>>,
    delay: RwLock<Option<Duration>>,
    failure: RwLock<Option<String>>,
    executions: AtomicUsize,
}

impl MemoryAnalysisEngine {
    /// Create an engine returning no rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every execution
    pub fn with_rows(self, rows: Vec<Vec<serde_json::Value>>) -> Self {
        *self.rows.write() = rows;
        self
    }

    /// Make every execution take `delay`
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    /// Make every execution fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.write() = Some(message.to_string());
    }

    /// Number of executions started so far
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisEngine for MemoryAnalysisEngine {
    fn engine_id(&self) -> &str {
        "memory"
    }

    async fn compute(&self, job: &AnalysisJob) -> Result<AnalysisResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.read().clone();
        if let Some(message) = failure {
            return Err(Error::Computing(ComputingError::Execution(message)));
        }

        let mut columns: Vec<String> = job.request.group_by.iter().map(|a| a.name()).collect();
        columns.extend(job.request.query.metrics.iter().cloned());
        let rows = self.rows.read().clone();
        Ok(AnalysisResult {
            fingerprint: job.status.fingerprint.clone(),
            columns,
            total_rows: rows.len(),
            rows,
            computed_at: current_time_ms(),
        })
    }
}

//! Per-tenant, per-project analytical context
//!
//! A [`Universe`] binds a project to the services needed to resolve
//! expressions in it: the definition parser, the metadata catalog, the
//! statistics source, the member source and the shared hierarchy manager.
//! Spaces hold an `Arc<Universe>`; axes hold an `Arc<Space>`. Nothing points
//! back from a universe to its spaces or axes.

pub mod axis;
pub mod space;

pub use axis::Axis;
pub use space::Space;

use crate::engine::traits::{DimensionCatalog, ExpressionParser, MemberSource, StatisticsService};
use crate::error::{Result, ScopeError};
use crate::expression::Expression;
use crate::hierarchy::{DomainHierarchy, HierarchyManager};
use crate::model::{Attribute, Dimension, Domain, Project};
use crate::types::{CustomerId, DomainId, UserContext};
use std::fmt;
use std::sync::Arc;

/// Services a universe delegates to
#[derive(Clone)]
pub struct UniverseServices {
    /// Dimension definition parser
    pub parser: Arc<dyn ExpressionParser>,
    /// Metadata catalog
    pub catalog: Arc<dyn DimensionCatalog>,
    /// Cardinality statistics
    pub statistics: Arc<dyn StatisticsService>,
    /// Member materialization
    pub members: Arc<dyn MemberSource>,
    /// Shared hierarchy manager
    pub hierarchies: Arc<HierarchyManager>,
}

/// Analytical context of one user on one project
pub struct Universe {
    ctx: UserContext,
    project: Project,
    services: UniverseServices,
}

impl Universe {
    /// Bind a project for a caller
    pub fn new(ctx: UserContext, project: Project, services: UniverseServices) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            project,
            services,
        })
    }

    /// Caller this universe was opened for
    pub fn context(&self) -> &UserContext {
        &self.ctx
    }

    /// Owning tenant
    pub fn customer_id(&self) -> &CustomerId {
        &self.project.customer_id
    }

    /// Bound project
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Definition parser
    pub fn parser(&self) -> &dyn ExpressionParser {
        self.services.parser.as_ref()
    }

    /// Metadata catalog
    pub fn catalog(&self) -> &dyn DimensionCatalog {
        self.services.catalog.as_ref()
    }

    /// Member source used to materialize indices
    pub fn members(&self) -> &Arc<dyn MemberSource> {
        &self.services.members
    }

    /// Look up a domain of the bound project
    pub fn domain(&self, id: &DomainId) -> std::result::Result<Domain, ScopeError> {
        self.catalog()
            .domain(&self.project.id, id)
            .ok_or_else(|| ScopeError::NotFound(format!("domain '{}'", id)))
    }

    /// Root space of a domain
    pub fn space(self: &Arc<Self>, domain: &Domain) -> Arc<Space> {
        Space::root(self.clone(), domain.clone())
    }

    /// Sub-dimensions of `dimension`
    pub fn sub_dimensions(&self, dimension: &Dimension) -> std::result::Result<Vec<Dimension>, ScopeError> {
        self.catalog().sub_dimensions(dimension)
    }

    /// Attributes of `dimension`, empty for ad-hoc axes
    pub fn attributes(&self, dimension: Option<&Dimension>) -> Vec<Attribute> {
        dimension
            .map(|d| self.catalog().attributes(d))
            .unwrap_or_default()
    }

    /// Statistics estimate for an expression of this project
    pub fn compute_statistics(&self, expression: &Expression) -> Result<f32> {
        self.services
            .statistics
            .compute_statistics(&self.project.id, expression)
    }

    /// Hierarchy of a root domain
    ///
    /// `None` while the hierarchy is being built and `wait` is false, or when
    /// the calling thread is the one building it.
    pub fn domain_hierarchy(
        self: &Arc<Self>,
        root: &Domain,
        wait: bool,
    ) -> Result<Option<Arc<DomainHierarchy>>> {
        self.services.hierarchies.domain_hierarchy(self, root, wait)
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Universe")
            .field("customer", &self.project.customer_id)
            .field("project", &self.project.id)
            .field("user", &self.ctx.user_id)
            .finish()
    }
}

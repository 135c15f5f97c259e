//! Persisted metadata referenced by the semantic layer
//!
//! Projects, domains, relations and dimensions are owned by the metadata
//! store. The semantic layer only reads them.

use crate::types::{CustomerId, DomainId, ProjectId};
use serde::{Deserialize, Serialize};

/// A project: the unit of access control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier
    pub id: ProjectId,
    /// Owning tenant
    pub customer_id: CustomerId,
    /// Display name
    pub name: String,
}

impl Project {
    /// Create a project
    pub fn new(customer_id: impl Into<CustomerId>, id: impl Into<ProjectId>, name: &str) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            name: name.to_string(),
        }
    }
}

/// A domain: a root table of the relational graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    /// Domain identifier
    pub id: DomainId,
    /// Owning project
    pub project_id: ProjectId,
    /// Display name
    pub name: String,
}

impl Domain {
    /// Create a domain
    pub fn new(project_id: impl Into<ProjectId>, id: impl Into<DomainId>, name: &str) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.to_string(),
        }
    }

    /// Object id used in canonical references
    pub fn oid(&self) -> &str {
        self.id.as_str()
    }
}

/// A join from one domain to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Relation object id
    pub oid: String,
    /// Display name, used in dotted expressions
    pub name: String,
    /// Source domain
    pub left: DomainId,
    /// Target domain
    pub right: DomainId,
}

impl Relation {
    /// Create a relation from `left` to `right`
    pub fn new(oid: &str, name: &str, left: impl Into<DomainId>, right: impl Into<DomainId>) -> Self {
        Self {
            oid: oid.to_string(),
            name: name.to_string(),
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Dimension kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DimensionType {
    /// Indexed dimension with a materialized member set
    #[default]
    Index,
    /// Categorical dimension
    Categorical,
    /// Continuous (numeric or temporal) dimension
    Continuous,
    /// Predefined segments
    Segments,
}

/// Compound key of a dimension
///
/// `dimension_id` is `None` for dynamic dimensions that are not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionPk {
    /// Owning project
    pub project_id: ProjectId,
    /// Owning domain
    pub domain_id: DomainId,
    /// Persisted dimension id
    pub dimension_id: Option<String>,
}

/// Dimension attribute (a secondary value attached to every member)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute object id
    pub oid: String,
    /// Display name
    pub name: String,
    /// Declared expression text
    pub expression: Option<String>,
}

/// A dimension: a named, typed expression over a domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    /// Compound key
    pub id: DimensionPk,
    /// Display name
    pub name: String,
    /// Dimension kind
    pub dimension_type: DimensionType,
    /// Id of the dimension this one is a sub-dimension of
    pub parent_id: Option<String>,
    /// Declared expression text
    pub expression: Option<String>,
}

impl Dimension {
    /// Create a persisted dimension
    pub fn new(domain: &crate::model::Domain, oid: &str, name: &str, expression: &str) -> Self {
        Self {
            id: DimensionPk {
                project_id: domain.project_id.clone(),
                domain_id: domain.id.clone(),
                dimension_id: Some(oid.to_string()),
            },
            name: name.to_string(),
            dimension_type: DimensionType::Index,
            parent_id: None,
            expression: Some(expression.to_string()),
        }
    }

    /// Create a dynamic (non-persisted) dimension
    pub fn dynamic(domain: &crate::model::Domain, name: &str, expression: Option<&str>) -> Self {
        Self {
            id: DimensionPk {
                project_id: domain.project_id.clone(),
                domain_id: domain.id.clone(),
                dimension_id: None,
            },
            name: name.to_string(),
            dimension_type: DimensionType::Index,
            parent_id: None,
            expression: expression.map(str::to_string),
        }
    }

    /// Mark this dimension as a sub-dimension of `parent`
    pub fn with_parent(mut self, parent: &Dimension) -> Self {
        self.parent_id = parent.id.dimension_id.clone();
        self
    }

    /// Set the dimension kind
    pub fn with_type(mut self, dimension_type: DimensionType) -> Self {
        self.dimension_type = dimension_type;
        self
    }

    /// Persisted object id, empty for dynamic dimensions
    pub fn oid(&self) -> &str {
        self.id.dimension_id.as_deref().unwrap_or("")
    }

    /// Whether this dimension is persisted (has a dimension id)
    pub fn is_persisted(&self) -> bool {
        self.id.dimension_id.is_some()
    }

    /// Stable identity used in axis ids
    pub fn uuid(&self) -> String {
        match &self.id.dimension_id {
            Some(id) => id.clone(),
            None => format!("~{}", self.name),
        }
    }
}

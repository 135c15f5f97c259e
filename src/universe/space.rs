//! Spaces: nodes of the relation composition graph
//!
//! A root space is a domain. A derived space is reached from its parent by
//! following one relation. The canonical id is the root domain oid followed
//! by the relation oids, so two spaces reached along the same path are equal
//! whatever object they were built from.

use super::axis::Axis;
use super::Universe;
use crate::error::ScopeError;
use crate::expression::{parse_expression, Expression};
use crate::model::{Dimension, Domain, Relation};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Node in the relation graph of a universe
pub struct Space {
    universe: Arc<Universe>,
    root: Domain,
    domain: Domain,
    relation: Option<Relation>,
    parent: Option<Arc<Space>>,
    id: String,
}

impl Space {
    /// Root space of a domain
    pub fn root(universe: Arc<Universe>, domain: Domain) -> Arc<Space> {
        let id = domain.oid().to_string();
        Arc::new(Space {
            universe,
            root: domain.clone(),
            domain,
            relation: None,
            parent: None,
            id,
        })
    }

    /// Follow `relation` from this space
    pub fn relate(self: &Arc<Self>, relation: &Relation) -> Result<Arc<Space>, ScopeError> {
        if relation.left != self.domain.id {
            return Err(ScopeError::InvalidValue {
                field: "relation".to_string(),
                message: format!(
                    "relation '{}' does not start from domain '{}'",
                    relation.name, self.domain.name
                ),
            });
        }
        let target = self.universe.domain(&relation.right)?;
        Ok(Arc::new(Space {
            universe: self.universe.clone(),
            root: self.root.clone(),
            domain: target,
            relation: Some(relation.clone()),
            parent: Some(self.clone()),
            id: format!("{}.{}", self.id, relation.oid),
        }))
    }

    /// Follow the relation named `name` from this space
    pub fn relate_named(self: &Arc<Self>, name: &str) -> Result<Arc<Space>, ScopeError> {
        let relation = self
            .universe
            .catalog()
            .relations(&self.domain)
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ScopeError::NotFound(format!("relation '{}'", name)))?;
        self.relate(&relation)
    }

    /// Canonical id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning universe
    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Domain the relation path starts from
    pub fn root_domain(&self) -> &Domain {
        &self.root
    }

    /// Domain this space lands on
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Space this one was derived from
    pub fn parent(&self) -> Option<&Arc<Space>> {
        self.parent.as_ref()
    }

    /// Relation followed from the parent
    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    /// Relations from the root to this space, in traversal order
    pub fn relation_path(&self) -> Vec<Relation> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(space) = current {
            if let Some(relation) = &space.relation {
                path.push(relation.clone());
            }
            current = space.parent.as_deref();
        }
        path.reverse();
        path
    }

    /// Composition of the relation path, `None` for a root space
    pub fn definition(&self) -> Option<Expression> {
        let relation = self.relation.as_ref()?;
        let step = Expression::relation(relation.name.clone());
        match self.parent.as_ref().and_then(|p| p.definition()) {
            Some(first) => Some(Expression::compose(first, step)),
            None => Some(step),
        }
    }

    /// Rebase the part of this space beyond `prefix` onto `prefix`'s domain
    pub fn prune(&self, prefix: &Space) -> Result<Arc<Space>, ScopeError> {
        let not_a_prefix = || ScopeError::NotAPrefix {
            space: self.id.clone(),
            prefix: prefix.id.clone(),
        };
        if prefix.root.id != self.root.id {
            return Err(not_a_prefix());
        }
        let path = self.relation_path();
        let prefix_path = prefix.relation_path();
        if prefix_path.len() > path.len()
            || path.iter().zip(&prefix_path).any(|(a, b)| a.oid != b.oid)
        {
            return Err(not_a_prefix());
        }

        let mut space = Space::root(self.universe.clone(), prefix.domain.clone());
        for relation in &path[prefix_path.len()..] {
            space = space.relate(relation)?;
        }
        Ok(space)
    }

    /// Axis on a dimension of this space
    pub fn a(self: &Arc<Self>, dimension: Dimension) -> Axis {
        Axis::new(self.clone(), dimension)
    }

    /// Axis on the dimension of this space named `name`
    pub fn a_named(self: &Arc<Self>, name: &str) -> Result<Axis, ScopeError> {
        self.universe
            .catalog()
            .dimensions(&self.domain)
            .into_iter()
            .find(|d| d.name == name)
            .map(|d| self.a(d))
            .ok_or_else(|| ScopeError::DimensionNotFound(name.to_string()))
    }

    /// Ad-hoc axis on an expression
    pub fn axis(self: &Arc<Self>, expression: Expression) -> Axis {
        Axis::ad_hoc(self.clone(), expression)
    }

    /// Resolve a group-by reference
    ///
    /// `#oid` selects a dimension by id, a bare name selects a dimension by
    /// name, anything else is parsed as an ad-hoc expression.
    pub fn resolve_axis(self: &Arc<Self>, reference: &str) -> Result<Axis, ScopeError> {
        let reference = reference.trim();
        let dimensions = self.universe.catalog().dimensions(&self.domain);
        if let Some(oid) = reference.strip_prefix('#') {
            return dimensions
                .into_iter()
                .find(|d| d.oid() == oid)
                .map(|d| self.a(d))
                .ok_or_else(|| ScopeError::DimensionNotFound(reference.to_string()));
        }
        if let Some(dimension) = dimensions.into_iter().find(|d| d.name == reference) {
            return Ok(self.a(dimension));
        }
        Ok(self.axis(parse_expression(reference)?))
    }

    /// Canonical rendering: `@'root'` followed by `.[relation]` steps
    pub fn pretty_print(&self) -> String {
        match (&self.parent, &self.relation) {
            (Some(parent), Some(relation)) => {
                format!("{}.[{}]", parent.pretty_print(), relation.name)
            }
            _ => format!("@'{}'", self.domain.oid()),
        }
    }
}

impl PartialEq for Space {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Space {}

impl Hash for Space {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("domain", &self.domain.name)
            .finish()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

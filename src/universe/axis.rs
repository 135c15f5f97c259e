//! Axes: dimensions or ad-hoc expressions anchored at a space
//!
//! The canonical id is computed once at construction as the parent space id,
//! a slash, then the dimension uuid (or the pretty-printed expression for an
//! ad-hoc axis). Equality and hashing use the id only; the display-name
//! override and the memoized definition never take part.

use super::space::Space;
use crate::error::{Error, Result, ScopeError};
use crate::expression::{ColumnReference, Expression, UNDEFINED_MARKER};
use crate::hierarchy::{DimensionIndex, DimensionMember};
use crate::model::{Attribute, Dimension, DimensionType};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// A dimension, or an ad-hoc expression, bound to a space
#[derive(Clone)]
pub struct Axis {
    parent: Arc<Space>,
    dimension: Option<Arc<Dimension>>,
    id: String,
    name: Option<String>,
    def_cache: OnceLock<Expression>,
}

impl Axis {
    /// Axis on a dimension
    pub fn new(parent: Arc<Space>, dimension: Dimension) -> Self {
        let id = format!("{}/{}", parent.id(), dimension.uuid());
        Self {
            parent,
            dimension: Some(Arc::new(dimension)),
            id,
            name: None,
            def_cache: OnceLock::new(),
        }
    }

    /// Ad-hoc axis on an expression; the expression is its definition
    pub fn ad_hoc(parent: Arc<Space>, expression: Expression) -> Self {
        let id = format!("{}/{}", parent.id(), expression.pretty_print());
        Self {
            parent,
            dimension: None,
            id,
            name: None,
            def_cache: OnceLock::from(expression),
        }
    }

    /// Copy of this axis under another id
    pub fn with_id(&self, id: impl Into<String>) -> Axis {
        Axis {
            id: id.into(),
            ..self.clone()
        }
    }

    // ========================================================================
    // Naming
    // ========================================================================

    /// Override the display name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Override the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// Take the display-name override of `other`, if it has one
    pub fn with_nickname(mut self, other: &Axis) -> Self {
        if let Some(name) = &other.name {
            self.name = Some(name.clone());
        }
        self
    }

    /// Whether a display-name override is set
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    /// Display name
    ///
    /// The override if any; else the index's dimension name, the dimension
    /// name, `#name` for a column-reference ad-hoc axis, or the id. Never
    /// waits for a hierarchy build.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(dimension) = &self.dimension {
            return match self.materialized_index() {
                Ok(Some(index)) => index.dimension_name().to_string(),
                Ok(None) => dimension.name.clone(),
                Err(_) => self.id.clone(),
            };
        }
        match self.def_cache.get() {
            Some(Expression::Column(ColumnReference { name })) => format!("#{}", name),
            _ => self.id.clone(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Canonical id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Space this axis is anchored at
    pub fn parent(&self) -> &Arc<Space> {
        &self.parent
    }

    /// Bound dimension, `None` for ad-hoc axes
    pub fn dimension(&self) -> Option<&Dimension> {
        self.dimension.as_deref()
    }

    /// Dimension kind, `Index` for ad-hoc axes
    pub fn dimension_type(&self) -> DimensionType {
        self.dimension
            .as_ref()
            .map(|d| d.dimension_type)
            .unwrap_or_default()
    }

    /// Attributes of the bound dimension
    pub fn attributes(&self) -> Vec<Attribute> {
        self.parent.universe().attributes(self.dimension())
    }

    // ========================================================================
    // Definition
    // ========================================================================

    /// Parent space definition composed with the dimension definition
    ///
    /// Computed on first call and reused afterwards.
    pub fn definition(&self) -> std::result::Result<Expression, ScopeError> {
        if let Some(cached) = self.def_cache.get() {
            return Ok(cached.clone());
        }
        let dimension = self
            .dimension
            .as_ref()
            .ok_or_else(|| ScopeError::UndefinedAxis(self.id.clone()))?;
        let universe = self.parent.universe();
        let second = universe.parser().parse(self.parent.domain(), dimension)?;
        let expression = match self.parent.definition() {
            Some(first) => Expression::compose(first, second),
            None => second,
        };
        // a concurrent caller may have filled the cell first; both values are equal
        let _ = self.def_cache.set(expression.clone());
        Ok(self.def_cache.get().cloned().unwrap_or(expression))
    }

    /// Definition, or `Undefined` wrapping the declared text when it does not resolve
    pub fn definition_safe(&self) -> Expression {
        match self.definition() {
            Ok(expression) => expression,
            Err(_) => Expression::undefined(
                self.dimension
                    .as_ref()
                    .and_then(|d| d.expression.clone()),
            ),
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Sub-dimension of the bound dimension named `name`
    pub fn a_named(&self, name: &str) -> std::result::Result<Axis, ScopeError> {
        if let Some(dimension) = &self.dimension {
            for sub in self.parent.universe().sub_dimensions(dimension)? {
                if sub.name == name {
                    return Ok(Axis::new(self.parent.clone(), sub));
                }
            }
        }
        Err(ScopeError::DimensionNotFound(name.to_string()))
    }

    /// Axis on `dimension` at the same space
    pub fn a(&self, dimension: Dimension) -> Axis {
        Axis::new(self.parent.clone(), dimension)
    }

    /// Axes on every sub-dimension, empty unless the dimension is persisted
    pub fn h(&self) -> Vec<Axis> {
        let Some(dimension) = self.dimension.as_ref().filter(|d| d.is_persisted()) else {
            return Vec::new();
        };
        match self.parent.universe().sub_dimensions(dimension) {
            Ok(subs) => subs
                .into_iter()
                .map(|d| Axis::new(self.parent.clone(), d))
                .collect(),
            Err(e) => {
                debug!(axis = %self.id, error = %e, "Sub-dimension lookup failed");
                Vec::new()
            }
        }
    }

    /// Collapse a multi-hop axis onto a root space of its own domain
    pub fn prune(&self) -> Axis {
        if self.parent.parent().is_none() {
            return self.clone();
        }
        let universe = self.parent.universe();
        let root = universe.space(self.parent.domain());
        let pruned = match &self.dimension {
            Some(dimension) => root.a(dimension.as_ref().clone()),
            None => match self.def_cache.get() {
                Some(expression) => root.axis(expression.clone()),
                None => return self.clone(),
            },
        };
        Axis {
            name: self.name.clone(),
            ..pruned
        }
    }

    /// Rebind this axis onto the part of its space beyond `prefix`
    pub fn prune_prefix(&self, prefix: &Space) -> std::result::Result<Axis, ScopeError> {
        let pruned = self.parent.prune(prefix)?;
        match (&self.dimension, self.def_cache.get()) {
            (Some(dimension), _) => Ok(pruned.a(dimension.as_ref().clone())),
            (None, Some(expression)) => Ok(pruned.axis(expression.clone())),
            (None, None) => Err(ScopeError::UndefinedAxis(self.id.clone())),
        }
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Index of this axis in the hierarchy of its root domain
    ///
    /// `None` when the hierarchy is not available without waiting, or when
    /// the axis is not indexed (ad-hoc or dynamic). Errors only on a genuine
    /// computation failure.
    pub fn index(&self, wait: bool) -> Result<Option<Arc<DimensionIndex>>> {
        let universe = self.parent.universe();
        match universe.domain_hierarchy(self.parent.root_domain(), wait)? {
            Some(hierarchy) => hierarchy.dimension_index(self),
            None => Ok(None),
        }
    }

    /// Index of this axis if it has already been materialized
    fn materialized_index(&self) -> Result<Option<Arc<DimensionIndex>>> {
        let universe = self.parent.universe();
        Ok(universe
            .domain_hierarchy(self.parent.root_domain(), false)?
            .and_then(|hierarchy| hierarchy.cached_index(&self.id)))
    }

    /// Whether this axis is `child` or one of its ancestors in the same hierarchy
    ///
    /// False when either index is unavailable.
    pub fn is_parent_dimension(&self, child: &Axis) -> Result<bool> {
        let (Some(parent_index), Some(child_index)) = (self.index(true)?, child.index(true)?)
        else {
            return Ok(false);
        };
        if parent_index.root() != child_index.root() || self.parent != child.parent {
            return Ok(false);
        }
        Ok(parent_index.is_ancestor_of(&child_index))
    }

    /// Members matching `value`
    ///
    /// Kept for compatibility: computation failures yield an empty set
    /// instead of an error. Only interruption is propagated.
    #[deprecated(note = "use the dimension index lookup")]
    pub fn find(&self, value: &str) -> Result<Vec<DimensionMember>> {
        match self.index(true) {
            Ok(Some(index)) => Ok(index.simple_lookup(value)),
            Ok(None) => Ok(Vec::new()),
            Err(e) if e.is_interrupted() => Err(e),
            Err(e) => {
                debug!(axis = %self.id, error = %e, "Member lookup failed");
                Ok(Vec::new())
            }
        }
    }

    // ========================================================================
    // Estimation
    // ========================================================================

    /// Best-effort cardinality estimate, `-1.0` when unknown
    ///
    /// Statistics first, then the member count of an already built index.
    /// Never waits for a hierarchy build and never fails.
    pub fn estimated_size(&self) -> f32 {
        match self.try_estimated_size() {
            Ok(size) => size,
            Err(e) => {
                debug!(axis = %self.id, error = %e, "Cardinality estimate failed");
                crate::metrics::ESTIMATION_FALLBACKS.inc();
                -1.0
            }
        }
    }

    fn try_estimated_size(&self) -> Result<f32> {
        let stats = self.compute_statistics()?;
        if stats >= 0.0 {
            return Ok(stats);
        }
        match self.materialized_index()? {
            Some(index) => {
                let count = index.members().len() as f32;
                Ok(if count > 0.0 { count } else { -1.0 })
            }
            None => Ok(-1.0),
        }
    }

    fn compute_statistics(&self) -> Result<f32> {
        let definition = self.definition().map_err(Error::from)?;
        self.parent.universe().compute_statistics(&definition)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Canonical rendering; never fails
    ///
    /// Persisted dimensions render as an id reference `#{oid}` after the
    /// parent space. Dynamic dimensions render their cached expression after
    /// the parent space. Ad-hoc axes render their expression alone.
    pub fn pretty_print(&self) -> String {
        match (&self.dimension, self.def_cache.get()) {
            (Some(dimension), _) if dimension.is_persisted() => {
                format!("{}.#{{{}}}", self.parent.pretty_print(), dimension.oid())
            }
            (Some(_), Some(expression)) => {
                format!("{}.{}", self.parent.pretty_print(), expression.pretty_print())
            }
            (None, Some(expression)) => expression.pretty_print(),
            _ => UNDEFINED_MARKER.to_string(),
        }
    }
}

impl PartialEq for Axis {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Axis {}

impl Hash for Axis {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Axis")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match (&self.dimension, self.def_cache.get()) {
            (Some(dimension), _) => dimension.name.clone(),
            (None, Some(expression)) => expression.pretty_print(),
            (None, None) => "???".to_string(),
        };
        write!(f, "Axis/{}.{}", self.parent, label)
    }
}

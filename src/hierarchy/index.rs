//! Dimension indices and members

use crate::model::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A materialized value of a dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionMember {
    /// Member key as rendered by the backend
    pub key: String,
    /// Attribute values by attribute name
    pub attributes: BTreeMap<String, String>,
}

impl DimensionMember {
    /// Member without attributes
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute value
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Whether `value` equals the key or any attribute value
    pub fn matches(&self, value: &str) -> bool {
        self.key == value || self.attributes.values().any(|v| v == value)
    }
}

/// Materialized member set of one axis, linked to its parent level
///
/// Two indices are equal when they belong to the same axis.
pub struct DimensionIndex {
    axis_id: String,
    dimension_id: String,
    dimension_name: String,
    parent: Option<Arc<DimensionIndex>>,
    members: Vec<DimensionMember>,
}

impl DimensionIndex {
    /// Index of `dimension` for the axis `axis_id`
    pub fn new(
        axis_id: &str,
        dimension: &Dimension,
        parent: Option<Arc<DimensionIndex>>,
        members: Vec<DimensionMember>,
    ) -> Self {
        Self {
            axis_id: axis_id.to_string(),
            dimension_id: dimension.oid().to_string(),
            dimension_name: dimension.name.clone(),
            parent,
            members,
        }
    }

    /// Id of the owning axis
    pub fn axis_id(&self) -> &str {
        &self.axis_id
    }

    /// Oid of the indexed dimension
    pub fn dimension_id(&self) -> &str {
        &self.dimension_id
    }

    /// Name of the indexed dimension
    pub fn dimension_name(&self) -> &str {
        &self.dimension_name
    }

    /// Parent level, if any
    pub fn parent(&self) -> Option<&Arc<DimensionIndex>> {
        self.parent.as_ref()
    }

    /// Top level of the hierarchy this index belongs to
    pub fn root(self: &Arc<Self>) -> Arc<DimensionIndex> {
        let mut current = self.clone();
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Materialized members
    pub fn members(&self) -> &[DimensionMember] {
        &self.members
    }

    /// Members whose key or an attribute equals `value`
    pub fn simple_lookup(&self, value: &str) -> Vec<DimensionMember> {
        self.members
            .iter()
            .filter(|m| m.matches(value))
            .cloned()
            .collect()
    }

    /// Whether `self` is `other` or one of its ancestors
    pub fn is_ancestor_of(&self, other: &DimensionIndex) -> bool {
        if self == other {
            return true;
        }
        let mut current = other.parent.as_deref();
        while let Some(index) = current {
            if index == self {
                return true;
            }
            current = index.parent.as_deref();
        }
        false
    }
}

impl PartialEq for DimensionIndex {
    fn eq(&self, other: &Self) -> bool {
        self.axis_id == other.axis_id
    }
}

impl Eq for DimensionIndex {}

impl fmt::Debug for DimensionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DimensionIndex")
            .field("axis_id", &self.axis_id)
            .field("dimension", &self.dimension_name)
            .field("members", &self.members.len())
            .field("parent", &self.parent.as_ref().map(|p| p.axis_id.clone()))
            .finish()
    }
}

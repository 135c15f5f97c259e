//! Domain hierarchies
//!
//! One [`DomainHierarchy`] per (customer, project, root domain), built on
//! first request by the [`HierarchyManager`]. A hierarchy maps axis ids to
//! [`DimensionIndex`] values, materialized lazily and cached. A build indexes
//! every persisted root dimension up front except those whose estimated
//! cardinality exceeds `max_members_per_index`; those are indexed on first
//! request.
//!
//! # Re-entrancy
//!
//! Building a hierarchy estimates the cardinality of every root dimension,
//! and estimation asks for the hierarchy again. A request made with
//! `wait = false`, or made from the thread that is building, returns `None`
//! instead of blocking, so the build can never wait on itself.

mod index;

pub use index::{DimensionIndex, DimensionMember};

use crate::analysis::{Fingerprint, JobKind, JobStatus};
use crate::engine::traits::MemberSource;
use crate::error::{ComputingError, Result};
use crate::model::Domain;
use crate::types::{CustomerId, DomainId, ProjectId};
use crate::universe::{Axis, Universe};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Hierarchy construction limits
#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    /// Members kept per index; larger member sets are truncated
    ///
    /// Dimensions estimated above this are not indexed during a build.
    pub max_members_per_index: usize,

    /// How long a waiting caller blocks on another thread's build
    pub build_wait_timeout: Duration,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_members_per_index: 100_000,
            build_wait_timeout: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// Domain hierarchy
// ============================================================================

/// Index cache of one root domain
pub struct DomainHierarchy {
    project: ProjectId,
    root: Domain,
    members: Arc<dyn MemberSource>,
    max_members: usize,
    indices: RwLock<HashMap<String, Arc<DimensionIndex>>>,
}

impl DomainHierarchy {
    fn new(
        project: ProjectId,
        root: Domain,
        members: Arc<dyn MemberSource>,
        max_members: usize,
    ) -> Self {
        Self {
            project,
            root,
            members,
            max_members,
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Root domain
    pub fn root(&self) -> &Domain {
        &self.root
    }

    /// Number of materialized indices
    pub fn len(&self) -> usize {
        self.indices.read().len()
    }

    /// True when nothing has been materialized yet
    pub fn is_empty(&self) -> bool {
        self.indices.read().is_empty()
    }

    /// Index of the axis with id `axis_id`, if already materialized
    pub fn cached_index(&self, axis_id: &str) -> Option<Arc<DimensionIndex>> {
        self.indices.read().get(axis_id).cloned()
    }

    /// Index of `axis`, materialized on first request
    ///
    /// `None` for axes that are not bound to a persisted dimension.
    pub fn dimension_index(&self, axis: &Axis) -> Result<Option<Arc<DimensionIndex>>> {
        if !axis.dimension().is_some_and(|d| d.is_persisted()) {
            return Ok(None);
        }
        let mut visiting = Vec::new();
        self.index_for(axis, &mut visiting).map(Some)
    }

    fn index_for(&self, axis: &Axis, visiting: &mut Vec<String>) -> Result<Arc<DimensionIndex>> {
        if let Some(found) = self.indices.read().get(axis.id()) {
            return Ok(found.clone());
        }
        let Some(dimension) = axis.dimension() else {
            return Err(ComputingError::Index(format!("axis '{}' has no dimension", axis.id())).into());
        };
        if visiting.iter().any(|id| id == axis.id()) {
            return Err(ComputingError::Index(format!("cyclic hierarchy at '{}'", axis.id())).into());
        }
        visiting.push(axis.id().to_string());

        let parent = match dimension.parent_id.as_deref() {
            Some(parent_id) => {
                let space = axis.parent();
                let parent_dimension = space
                    .universe()
                    .catalog()
                    .dimensions(space.domain())
                    .into_iter()
                    .find(|d| d.oid() == parent_id);
                match parent_dimension {
                    Some(parent_dimension) => Some(self.index_for(&axis.a(parent_dimension), visiting)?),
                    None => {
                        warn!(axis = %axis.id(), parent = %parent_id, "Parent dimension not found");
                        None
                    }
                }
            }
            None => None,
        };

        let mut members = self
            .members
            .read_members(&self.project, axis.parent().domain(), dimension)?;
        if members.len() > self.max_members {
            warn!(
                axis = %axis.id(),
                members = members.len(),
                limit = self.max_members,
                "Dimension index truncated"
            );
            members.truncate(self.max_members);
        }

        let index = Arc::new(DimensionIndex::new(axis.id(), dimension, parent, members));
        let mut indices = self.indices.write();
        Ok(indices.entry(axis.id().to_string()).or_insert(index).clone())
    }
}

// ============================================================================
// Manager
// ============================================================================

type HierarchyKey = (CustomerId, ProjectId, DomainId);

enum Slot {
    Building { builder: ThreadId, job: JobStatus },
    Ready(Arc<DomainHierarchy>),
}

/// Builds and caches domain hierarchies for every tenant
pub struct HierarchyManager {
    config: HierarchyConfig,
    slots: Mutex<HashMap<HierarchyKey, Slot>>,
    built: Condvar,
}

impl HierarchyManager {
    /// Create a manager
    pub fn new(config: HierarchyConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            built: Condvar::new(),
        }
    }

    /// Hierarchy of `root` for the universe's project
    ///
    /// Returns `None` without blocking when `wait` is false and the
    /// hierarchy is absent or being built, or when called from the building
    /// thread. Otherwise builds it, or waits for the thread building it.
    pub fn domain_hierarchy(
        &self,
        universe: &Arc<Universe>,
        root: &Domain,
        wait: bool,
    ) -> Result<Option<Arc<DomainHierarchy>>> {
        let key = (
            universe.customer_id().clone(),
            universe.project().id.clone(),
            root.id.clone(),
        );
        let deadline = Instant::now() + self.config.build_wait_timeout;

        let mut slots = self.slots.lock();
        loop {
            let builder = match slots.get(&key) {
                Some(Slot::Ready(hierarchy)) => return Ok(Some(hierarchy.clone())),
                Some(Slot::Building { builder, .. }) => Some(*builder),
                None => None,
            };
            match builder {
                Some(builder) => {
                    if !wait || builder == thread::current().id() {
                        return Ok(None);
                    }
                    if self.built.wait_until(&mut slots, deadline).timed_out() {
                        return Err(ComputingError::Hierarchy(format!(
                            "timed out waiting for hierarchy of '{}'",
                            root.name
                        ))
                        .into());
                    }
                }
                None => {
                    if !wait {
                        return Ok(None);
                    }
                    let mut job = JobStatus::pending(
                        JobKind::Hierarchy,
                        universe.context(),
                        universe.project().id.clone(),
                        Fingerprint(format!("hierarchy:{}", root.oid())),
                    );
                    job.start();
                    slots.insert(
                        key.clone(),
                        Slot::Building {
                            builder: thread::current().id(),
                            job,
                        },
                    );
                    break;
                }
            }
        }
        drop(slots);

        let guard = BuildGuard {
            manager: self,
            key: Some(key),
        };
        let hierarchy = Arc::new(self.build(universe, root));
        guard.complete(hierarchy.clone());
        Ok(Some(hierarchy))
    }

    fn build(&self, universe: &Arc<Universe>, root: &Domain) -> DomainHierarchy {
        let started = Instant::now();
        info!(
            customer = %universe.customer_id(),
            project = %universe.project().id,
            domain = %root.name,
            "Building domain hierarchy"
        );

        let hierarchy = DomainHierarchy::new(
            universe.project().id.clone(),
            root.clone(),
            universe.members().clone(),
            self.config.max_members_per_index,
        );
        let space = universe.space(root);
        let mut failures = 0usize;
        let mut deferred = 0usize;
        for dimension in universe.catalog().dimensions(root) {
            if !dimension.is_persisted() {
                continue;
            }
            let axis = space.a(dimension);
            // re-enters this manager with wait = false
            let estimate = axis.estimated_size();
            if estimate > self.config.max_members_per_index as f32 {
                deferred += 1;
                debug!(axis = %axis.id(), estimate, "Dimension too large to index eagerly");
                continue;
            }
            match hierarchy.dimension_index(&axis) {
                Ok(Some(index)) => debug!(
                    axis = %axis.id(),
                    estimate,
                    members = index.members().len(),
                    "Dimension indexed"
                ),
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    warn!(axis = %axis.id(), error = %e, "Dimension index failed");
                }
            }
        }

        let status = if failures == 0 { "success" } else { "partial" };
        crate::metrics::record_hierarchy_build(status);
        info!(
            domain = %root.name,
            indices = hierarchy.len(),
            deferred,
            failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Domain hierarchy built"
        );
        hierarchy
    }

    /// Hierarchy builds in progress for a customer
    pub fn ongoing_jobs(&self, customer: &CustomerId) -> Vec<JobStatus> {
        self.slots
            .lock()
            .iter()
            .filter(|((c, _, _), _)| c == customer)
            .filter_map(|(_, slot)| match slot {
                Slot::Building { job, .. } => Some(job.clone()),
                Slot::Ready(_) => None,
            })
            .collect()
    }

    /// Drop every built hierarchy of a project; returns how many were dropped
    pub fn invalidate(&self, customer: &CustomerId, project: &ProjectId) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|(c, p, _), slot| {
            !(c == customer && p == project && matches!(slot, Slot::Ready(_)))
        });
        let dropped = before - slots.len();
        if dropped > 0 {
            info!(customer = %customer, project = %project, dropped, "Hierarchies invalidated");
        }
        dropped
    }
}

impl Default for HierarchyManager {
    fn default() -> Self {
        Self::new(HierarchyConfig::default())
    }
}

/// Publishes the outcome of a build; clears the slot if the build unwinds
struct BuildGuard<'a> {
    manager: &'a HierarchyManager,
    key: Option<HierarchyKey>,
}

impl BuildGuard<'_> {
    fn complete(mut self, hierarchy: Arc<DomainHierarchy>) {
        if let Some(key) = self.key.take() {
            self.manager.slots.lock().insert(key, Slot::Ready(hierarchy));
            self.manager.built.notify_all();
        }
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!(domain = %key.2, "Hierarchy build aborted");
            crate::metrics::record_hierarchy_build("aborted");
            self.manager.slots.lock().remove(&key);
            self.manager.built.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use std::time::Duration;

    #[test]
    fn test_no_wait_when_absent() {
        let fx = Fixture::new();
        let hierarchy = fx
            .hierarchies
            .domain_hierarchy(&fx.universe(), &fx.sales, false)
            .unwrap();
        assert!(hierarchy.is_none());
    }

    #[test]
    fn test_build_materializes_root_dimensions() {
        let fx = Fixture::new();
        let hierarchy = fx
            .hierarchies
            .domain_hierarchy(&fx.universe(), &fx.sales, true)
            .unwrap()
            .unwrap();
        assert!(hierarchy.len() >= 2);

        let again = fx
            .hierarchies
            .domain_hierarchy(&fx.universe(), &fx.sales, false)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&hierarchy, &again));
    }

    #[test]
    fn test_index_parent_chain() {
        let fx = Fixture::new();
        let year = fx.sales_space().a_named("Year").unwrap();
        let quarter = year.a_named("Quarter").unwrap();
        let index = quarter.index(true).unwrap().unwrap();
        let parent = index.parent().unwrap();
        assert_eq!(parent.axis_id(), year.id());
        assert_eq!(index.root().axis_id(), year.id());
    }

    #[test]
    fn test_large_dimension_indexed_on_demand() {
        let fx = Fixture::new();
        let space = fx.sales_space();
        let year = space.a(fx.year.clone());
        let quarter = space.a(fx.quarter.clone());
        fx.statistics
            .set_estimate(&quarter.definition().unwrap(), 1_000_000.0);

        let hierarchy = fx
            .hierarchies
            .domain_hierarchy(&fx.universe(), &fx.sales, true)
            .unwrap()
            .unwrap();
        assert!(hierarchy.cached_index(year.id()).is_some());
        assert!(hierarchy.cached_index(quarter.id()).is_none());

        let index = quarter.index(true).unwrap().unwrap();
        assert_eq!(index.members().len(), 4);
        assert!(hierarchy.cached_index(quarter.id()).is_some());
    }

    #[test]
    fn test_failing_dimension_does_not_abort_build() {
        let fx = Fixture::new();
        fx.members.fail_on(&fx.year);
        let hierarchy = fx
            .hierarchies
            .domain_hierarchy(&fx.universe(), &fx.sales, true)
            .unwrap();
        assert!(hierarchy.is_some());

        let year = fx.sales_space().a_named("Year").unwrap();
        assert!(year.index(true).is_err());
    }

    #[test]
    fn test_concurrent_callers_share_one_build() {
        let fx = Fixture::new();
        fx.members.set_delay(Duration::from_millis(20));
        let universe = fx.universe();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = fx.hierarchies.clone();
                let universe = universe.clone();
                let sales = fx.sales.clone();
                std::thread::spawn(move || manager.domain_hierarchy(&universe, &sales, true))
            })
            .collect();
        let built: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().unwrap())
            .collect();
        assert!(built.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_ongoing_jobs_and_invalidate() {
        let fx = Fixture::new();
        fx.members.set_delay(Duration::from_millis(50));
        let manager = fx.hierarchies.clone();
        let universe = fx.universe();
        let sales = fx.sales.clone();
        let handle = std::thread::spawn(move || manager.domain_hierarchy(&universe, &sales, true));

        let customer = fx.universe().customer_id().clone();
        let mut seen = Vec::new();
        for _ in 0..100 {
            seen = fx.hierarchies.ongoing_jobs(&customer);
            if !seen.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, JobKind::Hierarchy);

        handle.join().unwrap().unwrap();
        assert!(fx.hierarchies.ongoing_jobs(&customer).is_empty());
        assert_eq!(
            fx.hierarchies.invalidate(&customer, &fx.universe().project().id),
            1
        );
    }
}

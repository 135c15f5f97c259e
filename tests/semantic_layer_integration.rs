//! Semantic layer integration tests
//!
//! Exercises universes, spaces and axes against in-memory collaborators:
//!
//! 1. **Axis identity** - independent resolution paths agree
//! 2. **Pruning** - relation paths collapse onto the target domain
//! 3. **Hierarchies** - parent chains and reflexive parent checks
//! 4. **Estimation** - never fails, never waits on a build

use kuba_olap::engine::{FixedStatistics, InMemoryCatalog, InMemoryMemberSource};
use kuba_olap::expression::{DottedParser, Expression};
use kuba_olap::hierarchy::{DimensionMember, HierarchyManager};
use kuba_olap::model::{Dimension, Domain, Project, Relation};
use kuba_olap::universe::{Space, Universe, UniverseServices};
use kuba_olap::UserContext;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

struct World {
    universe: Arc<Universe>,
    sales: Domain,
    members: Arc<InMemoryMemberSource>,
    statistics: Arc<FixedStatistics>,
    hierarchies: Arc<HierarchyManager>,
}

impl World {
    fn sales_space(&self) -> Arc<Space> {
        self.universe.space(&self.sales)
    }
}

/// Retail project: sales orders related to customers, customers to regions
fn create_world() -> World {
    let project = Project::new("acme", "p1", "Retail");
    let sales = Domain::new("p1", "sales", "Sales");
    let customers = Domain::new("p1", "customers", "Customers");
    let regions = Domain::new("p1", "regions", "Regions");

    let year = Dimension::new(&sales, "year", "Year", "order_year");
    let quarter = Dimension::new(&sales, "quarter", "Quarter", "order_quarter").with_parent(&year);
    let country = Dimension::new(&customers, "country", "Country", "country");

    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_project(project.clone());
    catalog.add_domain(sales.clone());
    catalog.add_domain(customers.clone());
    catalog.add_domain(regions);
    catalog.add_dimension(year.clone());
    catalog.add_dimension(quarter.clone());
    catalog.add_dimension(country.clone());
    catalog.add_relation(Relation::new("r_customer", "customer", "sales", "customers"));
    catalog.add_relation(Relation::new("r_region", "region", "customers", "regions"));

    let members = Arc::new(InMemoryMemberSource::new());
    members.set_members(&year, vec![DimensionMember::new("2023"), DimensionMember::new("2024")]);
    members.set_members(
        &quarter,
        vec![
            DimensionMember::new("Q1"),
            DimensionMember::new("Q2"),
            DimensionMember::new("Q3"),
            DimensionMember::new("Q4"),
        ],
    );
    members.set_members(&country, vec![DimensionMember::new("FR"), DimensionMember::new("US")]);

    let statistics = Arc::new(FixedStatistics::new());
    let hierarchies = Arc::new(HierarchyManager::default());
    let universe = Universe::new(
        UserContext::new("acme", "alice"),
        project,
        UniverseServices {
            parser: Arc::new(DottedParser),
            catalog,
            statistics: statistics.clone(),
            members: members.clone(),
            hierarchies: hierarchies.clone(),
        },
    );

    World {
        universe,
        sales,
        members,
        statistics,
        hierarchies,
    }
}

// =============================================================================
// Axis Identity
// =============================================================================

#[test]
fn test_axis_resolution_paths_agree() {
    let world = create_world();
    let space = world.sales_space();

    let by_name = space.a_named("Year").unwrap();
    let by_reference = space.resolve_axis("#year").unwrap();
    let renamed = by_name.clone().with_name("Order year");

    assert_eq!(by_name, by_reference);
    assert_eq!(by_name, renamed);
    assert_eq!(by_name.id(), "sales/year");
    assert_eq!(by_name.pretty_print(), "@'sales'.#{year}");
}

#[test]
fn test_definition_is_stable() {
    let world = create_world();
    let country = world
        .sales_space()
        .relate_named("customer")
        .unwrap()
        .a_named("Country")
        .unwrap();

    let first = country.definition().unwrap();
    for _ in 0..3 {
        assert_eq!(country.definition().unwrap(), first);
    }
    assert_eq!(first.pretty_print(), "[customer].country");
}

// =============================================================================
// Pruning
// =============================================================================

#[test]
fn test_prune_collapses_relation_path() {
    let world = create_world();
    let country = world
        .sales_space()
        .relate_named("customer")
        .unwrap()
        .a_named("Country")
        .unwrap();
    assert_eq!(country.id(), "sales.r_customer/country");
    assert_eq!(country.pretty_print(), "@'sales'.[customer].#{country}");

    let pruned = country.prune();
    assert_eq!(pruned.id(), "customers/country");
    assert_eq!(pruned.prune(), pruned);

    let year = world.sales_space().a_named("Year").unwrap();
    assert_eq!(year.prune(), year);
}

// =============================================================================
// Hierarchies
// =============================================================================

#[test]
fn test_parent_dimension_checks() {
    let world = create_world();
    let year = world.sales_space().a_named("Year").unwrap();
    let quarter = year.a_named("Quarter").unwrap();

    assert!(year.is_parent_dimension(&quarter).unwrap());
    assert!(year.is_parent_dimension(&year).unwrap());
    assert!(!quarter.is_parent_dimension(&year).unwrap());

    let adhoc = world.sales_space().axis(Expression::column("region"));
    assert!(!adhoc.is_parent_dimension(&year).unwrap());
    assert!(!year.is_parent_dimension(&adhoc).unwrap());
}

#[test]
fn test_hierarchy_invalidation_forces_rebuild() {
    let world = create_world();
    let year = world.sales_space().a_named("Year").unwrap();
    assert!(year.index(true).unwrap().is_some());
    let reads = world.members.reads();

    let project = world.universe.project().id.clone();
    assert_eq!(
        world.hierarchies.invalidate(world.universe.customer_id(), &project),
        1
    );
    assert!(year.index(false).unwrap().is_none());

    assert!(year.index(true).unwrap().is_some());
    assert!(world.members.reads() > reads);
}

// =============================================================================
// Estimation
// =============================================================================

#[test]
fn test_estimated_size_sources() {
    let world = create_world();
    let year = world.sales_space().a_named("Year").unwrap();

    // Unknown: no statistics and no hierarchy yet
    assert_eq!(year.estimated_size(), -1.0);

    // Member count once the index exists
    year.index(true).unwrap();
    assert_eq!(year.estimated_size(), 2.0);

    // Statistics take precedence
    world.statistics.set_estimate(&year.definition().unwrap(), 12.0);
    assert_eq!(year.estimated_size(), 12.0);
}

#[test]
fn test_estimated_size_swallows_statistics_failure() {
    let world = create_world();
    world.statistics.fail_with("statistics backend unavailable");
    let year = world.sales_space().a_named("Year").unwrap();
    assert_eq!(year.estimated_size(), -1.0);
}

#[test]
fn test_estimated_size_during_build_does_not_wait() {
    let world = create_world();
    world.members.set_delay(Duration::from_millis(100));

    let builder = {
        let year = world.sales_space().a_named("Year").unwrap();
        std::thread::spawn(move || year.index(true))
    };

    // Wait until the other thread has started building
    let customer = world.universe.customer_id().clone();
    for _ in 0..100 {
        if !world.hierarchies.ongoing_jobs(&customer).is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let quarter = world.sales_space().a_named("Quarter").unwrap();
    let started = std::time::Instant::now();
    assert_eq!(quarter.estimated_size(), -1.0);
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(builder.join().unwrap().unwrap().is_some());
}

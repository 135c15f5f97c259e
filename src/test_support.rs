//! Shared fixture for unit tests
//!
//! One project with three domains:
//! `sales --customer--> customers --region--> regions`.

use crate::engine::{FixedStatistics, InMemoryCatalog, InMemoryMemberSource, StaticAccessRights};
use crate::expression::DottedParser;
use crate::hierarchy::{DimensionMember, HierarchyManager};
use crate::model::{Dimension, Domain, Project, Relation};
use crate::types::{Role, UserContext};
use crate::universe::{Space, Universe, UniverseServices};
use std::sync::Arc;

#[allow(dead_code)]
pub(crate) struct Fixture {
    pub ctx: UserContext,
    pub project: Project,
    pub sales: Domain,
    pub customers: Domain,
    pub regions: Domain,
    pub year: Dimension,
    pub quarter: Dimension,
    pub country: Dimension,
    pub catalog: Arc<InMemoryCatalog>,
    pub statistics: Arc<FixedStatistics>,
    pub members: Arc<InMemoryMemberSource>,
    pub rights: Arc<StaticAccessRights>,
    pub hierarchies: Arc<HierarchyManager>,
    universe: Arc<Universe>,
}

impl Fixture {
    pub fn new() -> Self {
        let ctx = UserContext::new("acme", "alice");
        let project = Project::new("acme", "p1", "Retail");
        let sales = Domain::new("p1", "sales", "Sales");
        let customers = Domain::new("p1", "customers", "Customers");
        let regions = Domain::new("p1", "regions", "Regions");

        let year = Dimension::new(&sales, "year", "Year", "order_year");
        let quarter = Dimension::new(&sales, "quarter", "Quarter", "order_quarter").with_parent(&year);
        let broken = Dimension::new(&sales, "broken", "Broken", "a.b(");
        let country = Dimension::new(&customers, "country", "Country", "country");

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_project(project.clone());
        for domain in [&sales, &customers, &regions] {
            catalog.add_domain(domain.clone());
        }
        for dimension in [&year, &quarter, &broken, &country] {
            catalog.add_dimension(dimension.clone());
        }
        catalog.add_relation(Relation::new("r_customer", "customer", "sales", "customers"));
        catalog.add_relation(Relation::new("r_region", "region", "customers", "regions"));

        let members = Arc::new(InMemoryMemberSource::new());
        members.set_members(&year, vec![DimensionMember::new("2023"), DimensionMember::new("2024")]);
        members.set_members(
            &quarter,
            ["Q1", "Q2", "Q3", "Q4"].into_iter().map(DimensionMember::new).collect(),
        );
        members.set_members(&country, vec![DimensionMember::new("FR"), DimensionMember::new("US")]);

        let rights = Arc::new(StaticAccessRights::new());
        rights.grant("alice", "p1", Role::Write);

        let statistics = Arc::new(FixedStatistics::new());
        let hierarchies = Arc::new(HierarchyManager::default());

        let universe = Universe::new(
            ctx.clone(),
            project.clone(),
            UniverseServices {
                parser: Arc::new(DottedParser),
                catalog: catalog.clone(),
                statistics: statistics.clone(),
                members: members.clone(),
                hierarchies: hierarchies.clone(),
            },
        );

        Self {
            ctx,
            project,
            sales,
            customers,
            regions,
            year,
            quarter,
            country,
            catalog,
            statistics,
            members,
            rights,
            hierarchies,
            universe,
        }
    }

    pub fn universe(&self) -> Arc<Universe> {
        self.universe.clone()
    }

    pub fn sales_space(&self) -> Arc<Space> {
        self.universe.space(&self.sales)
    }
}

//! Analysis execution integration tests
//!
//! Runs analyses end to end through the public API:
//!
//! 1. **Parameter binding** - flat parameters resolve into a request
//! 2. **Single flight** - concurrent callers share one computation
//! 3. **Cluster** - services sharing a distributed cache compute once
//! 4. **Job status** - polling is filtered by project access rights

use kuba_olap::analysis::{AnalysisOutcome, AnalysisRequest, AnalysisService, ExecutorConfig, RunOptions};
use kuba_olap::api::{AnalysisParams, JobStatusService};
use kuba_olap::cache::{AnalysisCache, CacheConfig, InMemoryDistributedCache};
use kuba_olap::engine::{
    FixedStatistics, InMemoryCatalog, InMemoryMemberSource, MemoryAnalysisEngine, StaticAccessRights,
};
use kuba_olap::error::{Error, ScopeError};
use kuba_olap::expression::DottedParser;
use kuba_olap::hierarchy::HierarchyManager;
use kuba_olap::model::{Dimension, Domain, Project};
use kuba_olap::types::Role;
use kuba_olap::universe::{Universe, UniverseServices};
use kuba_olap::UserContext;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

struct Cluster {
    catalog: Arc<InMemoryCatalog>,
    rights: Arc<StaticAccessRights>,
    hierarchies: Arc<HierarchyManager>,
    services: UniverseServices,
    project: Project,
}

fn create_cluster() -> Cluster {
    let project = Project::new("acme", "p1", "Retail");
    let sales = Domain::new("p1", "sales", "Sales");
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_project(project.clone());
    catalog.add_domain(sales.clone());
    catalog.add_dimension(Dimension::new(&sales, "year", "Year", "order_year"));
    catalog.add_dimension(Dimension::new(&sales, "region", "Region", "region"));

    let rights = Arc::new(StaticAccessRights::new());
    rights.grant("alice", "p1", Role::Write);
    rights.grant("bob", "p1", Role::Read);
    rights.grant("dave", "p1", Role::Read);

    let hierarchies = Arc::new(HierarchyManager::default());
    let services = UniverseServices {
        parser: Arc::new(DottedParser),
        catalog: catalog.clone(),
        statistics: Arc::new(FixedStatistics::new()),
        members: Arc::new(InMemoryMemberSource::new()),
        hierarchies: hierarchies.clone(),
    };

    Cluster {
        catalog,
        rights,
        hierarchies,
        services,
        project,
    }
}

impl Cluster {
    fn universe(&self, user: &str) -> Arc<Universe> {
        Universe::new(
            UserContext::new("acme", user),
            self.project.clone(),
            self.services.clone(),
        )
    }

    fn request(&self, user: &str, params: &AnalysisParams) -> Arc<AnalysisRequest> {
        let query = params.to_query().unwrap();
        Arc::new(AnalysisRequest::resolve(self.universe(user), query).unwrap())
    }
}

fn node(engine: Arc<MemoryAnalysisEngine>, remote: Arc<InMemoryDistributedCache>) -> Arc<AnalysisService> {
    AnalysisService::new(
        ExecutorConfig {
            remote_poll_interval: Duration::from_millis(10),
            ..Default::default()
        },
        engine,
        Arc::new(AnalysisCache::new(CacheConfig::default())),
        remote,
    )
}

fn sales_by_year() -> AnalysisParams {
    AnalysisParams {
        domain: "sales".into(),
        group_by: vec!["#year".into()],
        metrics: vec!["count".into()],
        ..Default::default()
    }
}

// =============================================================================
// Parameter Binding
// =============================================================================

#[test]
fn test_params_resolve_against_universe() {
    let cluster = create_cluster();
    let params = AnalysisParams {
        group_by: vec!["#year".into(), "#region".into()],
        rollups: vec!["-1".into(), "LAST(1)".into()],
        ..sales_by_year()
    };
    let request = cluster.request("alice", &params);
    let ids: Vec<_> = request.group_by.iter().map(|a| a.id().to_string()).collect();
    assert_eq!(ids, vec!["sales/year", "sales/region"]);
    assert_eq!(request.query.rollups.len(), 2);
}

#[test]
fn test_params_reject_out_of_range_rollup() {
    let params = AnalysisParams {
        rollups: vec!["0".into(), "last(3)".into()],
        ..sales_by_year()
    };
    let err = params.to_query().unwrap_err();
    assert_eq!(
        err,
        ScopeError::InvalidRollup {
            position: 2,
            message: "the index specified (3) is not defined".to_string(),
        }
    );
}

#[test]
fn test_fingerprint_ignores_presentation() {
    let cluster = create_cluster();
    let plain = cluster.request("alice", &sales_by_year());
    let styled = cluster.request(
        "bob",
        &AnalysisParams {
            format: Some("csv".into()),
            lazy: Some("true".into()),
            ..sales_by_year()
        },
    );
    assert_eq!(plain.fingerprint(), styled.fingerprint());

    let other = cluster.request(
        "alice",
        &AnalysisParams {
            group_by: vec!["#region".into()],
            ..sales_by_year()
        },
    );
    assert_ne!(plain.fingerprint(), other.fingerprint());
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test]
async fn test_concurrent_callers_share_one_computation() {
    let cluster = create_cluster();
    let engine = Arc::new(
        MemoryAnalysisEngine::new()
            .with_rows(vec![vec![json!(2023), json!(4)], vec![json!(2024), json!(7)]])
            .with_delay(Duration::from_millis(100)),
    );
    let svc = node(engine.clone(), Arc::new(InMemoryDistributedCache::new()));
    let users = ["alice", "bob", "dave", "alice"];

    let outcomes = join_all(users.iter().map(|user| {
        let svc = svc.clone();
        let request = cluster.request(user, &sales_by_year());
        let ctx = UserContext::new("acme", *user);
        async move { svc.run(&ctx, request, RunOptions::default()).await }
    }))
    .await;
    let outcomes: Vec<_> = outcomes.into_iter().map(|o| o.unwrap()).collect();
    let first = &outcomes[0];

    assert_eq!(engine.executions(), 1);
    let result = first.result().unwrap();
    assert!(outcomes.iter().all(|o| o.result() == Some(result)));
    assert_eq!(result.columns, vec!["Year", "count"]);
    assert_eq!(result.total_rows, 2);
    assert_eq!(result.page(1, Some(10)), &[vec![json!(2024), json!(7)]]);
}

#[tokio::test]
async fn test_lazy_params_after_computation() {
    let cluster = create_cluster();
    let svc = node(Arc::new(MemoryAnalysisEngine::new()), Arc::new(InMemoryDistributedCache::new()));
    let ctx = UserContext::new("acme", "alice");
    let lazy = AnalysisParams {
        lazy: Some("true".into()),
        ..sales_by_year()
    };

    let err = svc
        .run(&ctx, cluster.request("alice", &lazy), lazy.run_options())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInCache(_)));

    svc.run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default())
        .await
        .unwrap();
    let outcome = svc
        .run(&ctx, cluster.request("alice", &lazy), lazy.run_options())
        .await
        .unwrap();
    assert!(outcome.result().is_some());
}

// =============================================================================
// Cluster
// =============================================================================

#[tokio::test]
async fn test_nodes_sharing_a_distributed_cache_compute_once() {
    let cluster = create_cluster();
    let remote = Arc::new(InMemoryDistributedCache::new());
    let engine_a = Arc::new(MemoryAnalysisEngine::new().with_delay(Duration::from_millis(100)));
    let engine_b = Arc::new(MemoryAnalysisEngine::new().with_delay(Duration::from_millis(100)));
    let node_a = node(engine_a.clone(), remote.clone());
    let node_b = node(engine_b.clone(), remote.clone());
    let ctx = UserContext::new("acme", "alice");

    let (a, b) = tokio::join!(
        node_a.run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default()),
        node_b.run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default()),
    );

    assert_eq!(engine_a.executions() + engine_b.executions(), 1);
    assert_eq!(a.unwrap().result().unwrap(), b.unwrap().result().unwrap());
    assert_eq!(remote.result_count(), 1);
}

#[tokio::test]
async fn test_invalidate_project_forces_recompute() {
    let cluster = create_cluster();
    let engine = Arc::new(MemoryAnalysisEngine::new());
    let svc = node(engine.clone(), Arc::new(InMemoryDistributedCache::new()));
    let ctx = UserContext::new("acme", "alice");

    svc.run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(svc.invalidate_project(&ctx.customer_id, &cluster.project.id).await, 1);
    assert_eq!(svc.local_cache().entry_count(), 0);

    // The distributed copy is gone too, so the rerun computes again
    let outcome = svc
        .run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default())
        .await
        .unwrap();
    assert!(outcome.result().is_some());
    assert_eq!(engine.executions(), 2);
}

#[tokio::test]
async fn test_invalidate_project_on_one_node_clears_shared_results() {
    let cluster = create_cluster();
    let remote = Arc::new(InMemoryDistributedCache::new());
    let engine_a = Arc::new(MemoryAnalysisEngine::new());
    let engine_b = Arc::new(MemoryAnalysisEngine::new());
    let node_a = node(engine_a.clone(), remote.clone());
    let node_b = node(engine_b.clone(), remote.clone());
    let ctx = UserContext::new("acme", "alice");

    node_a
        .run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(remote.result_count(), 1);

    node_a.invalidate_project(&ctx.customer_id, &cluster.project.id).await;
    assert_eq!(remote.result_count(), 0);

    node_b
        .run(&ctx, cluster.request("alice", &sales_by_year()), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(engine_a.executions(), 1);
    assert_eq!(engine_b.executions(), 1);
}

// =============================================================================
// Job Status
// =============================================================================

#[tokio::test]
async fn test_job_status_respects_access_rights() {
    let cluster = create_cluster();
    let engine = Arc::new(MemoryAnalysisEngine::new().with_delay(Duration::from_millis(500)));
    let svc = node(engine, Arc::new(InMemoryDistributedCache::new()));
    let status_service = JobStatusService::new(
        svc.clone(),
        cluster.hierarchies.clone(),
        cluster.catalog.clone(),
        cluster.rights.clone(),
    );

    let dave = UserContext::new("acme", "dave");
    let outcome = svc
        .run(
            &dave,
            cluster.request("dave", &sales_by_year()),
            RunOptions::with_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap();
    let AnalysisOutcome::Pending(job) = outcome else {
        panic!("expected a pending job");
    };

    let sees = |user: &str| UserContext::new("acme", user);
    assert!(status_service.status(&sees("dave"), &job.job_id).await.is_some());
    assert!(status_service.status(&sees("alice"), &job.job_id).await.is_some());
    assert!(status_service.status(&sees("bob"), &job.job_id).await.is_none());
    assert!(status_service.status(&sees("mallory"), &job.job_id).await.is_none());
    assert!(status_service
        .status(&UserContext::new("other", "dave"), &job.job_id)
        .await
        .is_none());

    assert_eq!(status_service.list(&sees("dave")).await.len(), 1);
    assert!(status_service.list(&sees("bob")).await.is_empty());

    assert!(svc.cancel(&job.job_id));
}

//! Distributed cache tests against a live Redis server
//!
//! Every test writes under its own key prefix, so runs do not interfere.
//!
//! Run with: REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_integration -- --ignored

use kuba_olap::analysis::{AnalysisResult, Fingerprint, JobKind, JobState};
use kuba_olap::cache::{CacheKey, DistributedCache};
use kuba_olap::redis::{RedisConfig, RedisDistributedCache};
use kuba_olap::{CustomerId, JobId, JobStatus, ProjectId, UserContext};
use serde_json::json;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn connect() -> RedisDistributedCache {
    let prefix = format!("olaptest-{}", uuid::Uuid::new_v4().simple());
    RedisDistributedCache::new(RedisConfig::with_url(redis_url()).key_prefix(prefix))
        .await
        .expect("Redis must be reachable at REDIS_URL")
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(redis_url())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

fn key(fingerprint: &str) -> CacheKey {
    CacheKey::new(CustomerId::new("acme"), Fingerprint(fingerprint.to_string()))
}

fn result(fingerprint: &str) -> AnalysisResult {
    AnalysisResult {
        fingerprint: Fingerprint(fingerprint.to_string()),
        columns: vec!["Year".into(), "count".into()],
        rows: vec![vec![json!(2024), json!(10)]],
        total_rows: 1,
        computed_at: 0,
    }
}

fn job(fingerprint: &str) -> JobStatus {
    JobStatus::pending(
        JobKind::Analysis,
        &UserContext::new("acme", "alice"),
        ProjectId::new("p1"),
        Fingerprint(fingerprint.to_string()),
    )
}

// =============================================================================
// Claims
// =============================================================================

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn test_claim_is_exclusive_until_released() {
    let cache = connect().await;
    let k = key("f1");
    let (first, second) = (JobId::new(), JobId::new());
    let ttl = Duration::from_secs(30);

    assert!(cache.try_claim(&k, &first, ttl).await.unwrap());
    assert!(!cache.try_claim(&k, &second, ttl).await.unwrap());
    // the holder may claim again
    assert!(cache.try_claim(&k, &first, ttl).await.unwrap());

    // releasing someone else's claim leaves it in place
    cache.release(&k, &second).await.unwrap();
    assert!(!cache.try_claim(&k, &second, ttl).await.unwrap());

    cache.release(&k, &first).await.unwrap();
    assert!(cache.try_claim(&k, &second, ttl).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn test_claim_expires_with_ttl() {
    let cache = connect().await;
    let k = key("f1");

    assert!(cache.try_claim(&k, &JobId::new(), Duration::from_millis(100)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(cache.try_claim(&k, &JobId::new(), Duration::from_secs(30)).await.unwrap());
}

// =============================================================================
// Results
// =============================================================================

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn test_invalidate_project_removes_only_its_results() {
    let cache = connect().await;
    let ttl = Duration::from_secs(30);
    let (p1, p2) = (ProjectId::new("p1"), ProjectId::new("p2"));

    cache.put_result(&key("a"), &p1, &result("a"), ttl).await.unwrap();
    cache.put_result(&key("b"), &p1, &result("b"), ttl).await.unwrap();
    cache.put_result(&key("c"), &p2, &result("c"), ttl).await.unwrap();
    assert_eq!(cache.get_result(&key("a")).await.unwrap(), Some(result("a")));

    let removed = cache.invalidate_project(&CustomerId::new("acme"), &p1).await.unwrap();
    assert_eq!(removed, 2);
    assert!(cache.get_result(&key("a")).await.unwrap().is_none());
    assert!(cache.get_result(&key("b")).await.unwrap().is_none());
    assert!(cache.get_result(&key("c")).await.unwrap().is_some());

    assert_eq!(cache.invalidate_project(&CustomerId::new("acme"), &p1).await.unwrap(), 0);
}

// =============================================================================
// Job registry
// =============================================================================

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn test_finished_jobs_are_pruned_after_ttl() {
    let cache = connect().await;
    let customer = CustomerId::new("acme");

    let mut finished = job("done");
    finished.finish(JobState::Done);
    cache.register_job(&finished, Duration::from_millis(200)).await.unwrap();

    let ongoing = job("running");
    cache.register_job(&ongoing, Duration::from_secs(60)).await.unwrap();
    assert_eq!(cache.list_jobs(&customer).await.unwrap().len(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let listed = cache.list_jobs(&customer).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, ongoing.job_id);

    // the pruned entry is deleted, not just filtered
    let prefix = cache.pool().config().key_prefix.clone();
    let mut conn = raw_connection().await;
    let entries: usize = redis::cmd("HLEN")
        .arg(format!("{}:acme:jobs", prefix))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(entries, 1);
}

#[tokio::test]
#[ignore = "requires a Redis server at REDIS_URL"]
async fn test_job_update_overwrites_status() {
    let cache = connect().await;
    let customer = CustomerId::new("acme");
    let ttl = Duration::from_secs(60);

    let mut status = job("f1");
    cache.register_job(&status, ttl).await.unwrap();
    status.start();
    cache.update_job(&status, ttl).await.unwrap();

    let listed = cache.list_jobs(&customer).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, JobState::Running);
    assert!(cache.list_jobs(&CustomerId::new("globex")).await.unwrap().is_empty());
}

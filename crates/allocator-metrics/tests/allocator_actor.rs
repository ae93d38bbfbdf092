//! Integration tests for the allocator actor.
//!
//! Exercises the full path: handle requests mutate allocator state, the
//! actor drives the registries, and pull gauges read back through the
//! actor's mailbox.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use allocator_metrics::actors::{AllocatorActorHandle, AllocatorOptions};
use allocator_metrics::catalog::{InMemoryCatalog, MetricsCatalog};
use allocator_metrics::errors::{AllocatorError, SourceError};
use allocator_metrics::gauge::MetricSource;
use allocator_metrics::registry::allocator::{
    offer_filters_active_name, quota_guarantee_name, quota_offered_or_allocated_name,
    resource_offered_or_allocated_name, resource_total_name, ALLOCATION_RUNS,
    EVENT_QUEUE_DISPATCHES,
};
use allocator_metrics::registry::framework::{
    drf_position_max_name, drf_position_min_name, metric_prefix, resources_filtered_reason_name,
    suppressed_name,
};
use allocator_metrics::registry::{AllocatorQuery, AllocatorQuerySource, FilterReason};
use allocator_test_utils::{
    assert_catalog_empty, assert_no_names_with_prefix, assert_not_registered, assert_registered,
    framework_info, quota, report_options, resource_kinds, resources,
};
use common::types::{AgentId, FrameworkId};
use tokio::task::JoinHandle;

// ============================================================================
// Helpers
// ============================================================================

fn spawn_allocator(catalog: &Arc<InMemoryCatalog>) -> (AllocatorActorHandle, JoinHandle<()>) {
    let options = AllocatorOptions {
        allocator_id: "allocator-it".to_string(),
        resource_kinds: resource_kinds(&["cpus", "mem"]),
        registry: report_options(),
        ..AllocatorOptions::default()
    };
    let catalog: Arc<dyn MetricsCatalog> = catalog.clone();
    AllocatorActorHandle::spawn(options, catalog).expect("allocator should start")
}

fn roles(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(ToString::to_string).collect()
}

async fn read(catalog: &InMemoryCatalog, name: &str) -> f64 {
    catalog
        .read(name)
        .await
        .unwrap_or_else(|| panic!("{name} not registered"))
        .unwrap_or_else(|e| panic!("{name} unreadable: {e}"))
}

async fn stop(allocator: AllocatorActorHandle, task: JoinHandle<()>) {
    allocator.shutdown().await.unwrap();
    task.await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_cluster_lifecycle_mirrors_catalog() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 10.0), ("mem", 1024.0)]))
        .await
        .unwrap();

    let spark = framework_info("fw-1", "spark", &["web"]);
    let flink = framework_info("fw-2", "flink", &["web", "batch"]);
    allocator.add_framework(spark.clone(), BTreeSet::new()).await.unwrap();
    allocator.add_framework(flink.clone(), BTreeSet::new()).await.unwrap();
    assert_registered(
        &catalog,
        &[offer_filters_active_name("web"), offer_filters_active_name("batch")],
    );

    allocator.set_quota("web", quota(&[("cpus", 4.0)])).await.unwrap();
    allocator
        .record_allocation(spark.id.clone(), "web", resources(&[("cpus", 2.0), ("mem", 128.0)]))
        .await
        .unwrap();

    assert_eq!(read(&catalog, &resource_total_name("cpus")).await, 10.0);
    assert_eq!(read(&catalog, &resource_total_name("mem")).await, 1024.0);
    assert_eq!(read(&catalog, &resource_offered_or_allocated_name("cpus")).await, 2.0);
    assert_eq!(read(&catalog, &quota_guarantee_name("web", "cpus")).await, 4.0);
    assert_eq!(read(&catalog, &quota_offered_or_allocated_name("web", "cpus")).await, 2.0);

    let summary = allocator.run_allocation().await.unwrap();
    assert_eq!(summary.roles, 2);
    assert_eq!(summary.frameworks, 3);
    assert_eq!(read(&catalog, ALLOCATION_RUNS).await, 1.0);

    // flink holds nothing in web, so it ranks ahead of spark
    let spark_prefix = metric_prefix(&spark);
    let flink_prefix = metric_prefix(&flink);
    assert_eq!(read(&catalog, &drf_position_min_name(&flink_prefix, "web")).await, 0.0);
    assert_eq!(read(&catalog, &drf_position_max_name(&flink_prefix, "web")).await, 0.0);
    assert_eq!(read(&catalog, &drf_position_min_name(&spark_prefix, "web")).await, 1.0);
    assert_eq!(read(&catalog, &drf_position_max_name(&spark_prefix, "web")).await, 1.0);
    assert_eq!(read(&catalog, &drf_position_min_name(&flink_prefix, "batch")).await, 0.0);

    allocator.remove_framework(spark.id.clone()).await.unwrap();
    assert_no_names_with_prefix(&catalog, &spark_prefix);
    assert_registered(&catalog, &[offer_filters_active_name("web")]);
    assert_eq!(read(&catalog, &resource_offered_or_allocated_name("cpus")).await, 0.0);

    allocator.remove_framework(flink.id.clone()).await.unwrap();
    assert_no_names_with_prefix(&catalog, &flink_prefix);
    assert_no_names_with_prefix(&catalog, "allocator/mesos/offer_filters/");

    allocator.remove_quota("web").await.unwrap();
    assert_no_names_with_prefix(&catalog, "allocator/mesos/quota/");

    stop(allocator, task).await;
    assert_catalog_empty(&catalog);
}

#[tokio::test]
async fn test_shutdown_with_live_state_unregisters_everything() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 4.0)]))
        .await
        .unwrap();
    for id in ["fw-1", "fw-2", "fw-3"] {
        allocator
            .add_framework(framework_info(id, "svc", &["web", id]), roles(&[id]))
            .await
            .unwrap();
    }
    allocator.set_quota("web", quota(&[("cpus", 1.0), ("mem", 8.0)])).await.unwrap();
    allocator.run_allocation().await.unwrap();
    assert!(catalog.len() > 30);

    stop(allocator, task).await;
    assert_catalog_empty(&catalog);
}

#[tokio::test]
async fn test_cancellation_unregisters_everything() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let child = allocator.child_token();

    allocator
        .add_framework(framework_info("fw-1", "spark", &["web"]), BTreeSet::new())
        .await
        .unwrap();

    allocator.cancel();
    task.await.unwrap();

    assert!(allocator.is_cancelled());
    assert!(child.is_cancelled());
    assert_catalog_empty(&catalog);
    assert!(matches!(
        allocator.get_status().await,
        Err(AllocatorError::Internal(_))
    ));
}

#[tokio::test]
async fn test_catalog_does_not_keep_allocator_alive() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    assert!(!catalog.is_empty());

    // The catalog still holds pull gauges bound to the actor
    drop(allocator);
    task.await.unwrap();

    assert_catalog_empty(&catalog);
}

#[tokio::test]
async fn test_reads_after_shutdown_are_unavailable() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let source = allocator.query_source();
    let Some(MetricSource::Pull(dispatches)) = catalog.source(EVENT_QUEUE_DISPATCHES) else {
        panic!("event queue gauge should be a pull gauge");
    };

    assert!(dispatches.read().await.is_ok());

    allocator.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(dispatches.read().await, Err(SourceError::Unavailable));
    assert_eq!(
        source.query(AllocatorQuery::EventQueueDispatches).await,
        Err(SourceError::Unavailable)
    );
    assert_eq!(catalog.read(EVENT_QUEUE_DISPATCHES).await, None);
}

#[tokio::test]
async fn test_second_shutdown_after_stop_fails() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);

    allocator.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(
        allocator.shutdown().await,
        Err(AllocatorError::Internal(_))
    ));
}

// ============================================================================
// Roles, Suppression and Offer Filters
// ============================================================================

#[tokio::test]
async fn test_suppress_and_revive_through_actor() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web", "batch"]);
    let prefix = metric_prefix(&info);

    allocator.add_framework(info.clone(), roles(&["batch"])).await.unwrap();
    assert_eq!(read(&catalog, &suppressed_name(&prefix, "web")).await, 0.0);
    assert_eq!(read(&catalog, &suppressed_name(&prefix, "batch")).await, 1.0);

    allocator.suppress_roles(info.id.clone(), roles(&["web"])).await.unwrap();
    allocator.revive_roles(info.id.clone(), roles(&["batch"])).await.unwrap();
    assert_eq!(read(&catalog, &suppressed_name(&prefix, "web")).await, 1.0);
    assert_eq!(read(&catalog, &suppressed_name(&prefix, "batch")).await, 0.0);

    let err = allocator
        .suppress_roles(info.id.clone(), roles(&["analytics"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocatorError::Conflict(_)));
    assert_not_registered(&catalog, &[suppressed_name(&prefix, "analytics")]);

    stop(allocator, task).await;
}

#[tokio::test]
async fn test_update_framework_moves_role_metrics() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web"]);
    let prefix = metric_prefix(&info);

    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator.run_allocation().await.unwrap();
    assert_registered(&catalog, &[drf_position_min_name(&prefix, "web")]);

    allocator
        .update_framework(framework_info("fw-1", "spark", &["batch"]))
        .await
        .unwrap();

    assert_not_registered(
        &catalog,
        &[
            offer_filters_active_name("web"),
            suppressed_name(&prefix, "web"),
            drf_position_min_name(&prefix, "web"),
            drf_position_max_name(&prefix, "web"),
        ],
    );
    assert_registered(
        &catalog,
        &[offer_filters_active_name("batch"), suppressed_name(&prefix, "batch")],
    );

    stop(allocator, task).await;
    assert_catalog_empty(&catalog);
}

#[tokio::test(start_paused = true)]
async fn test_declined_offers_counted_until_filter_expires() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web"]);
    let decline = resources_filtered_reason_name(&metric_prefix(&info), FilterReason::Decline);
    let filters = offer_filters_active_name("web");

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 4.0)]))
        .await
        .unwrap();
    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator
        .decline_offer(info.id.clone(), "web", AgentId::from("agent-1"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(read(&catalog, &filters).await, 1.0);
    allocator.run_allocation().await.unwrap();
    assert_eq!(read(&catalog, &decline).await, 1.0);

    tokio::time::advance(Duration::from_secs(6)).await;

    assert_eq!(read(&catalog, &filters).await, 0.0);
    allocator.run_allocation().await.unwrap();
    assert_eq!(read(&catalog, &decline).await, 1.0);

    stop(allocator, task).await;
}

#[tokio::test(start_paused = true)]
async fn test_refuse_forever_keeps_allocator_running() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web"]);
    let filters = offer_filters_active_name("web");

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 4.0)]))
        .await
        .unwrap();
    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator
        .decline_offer(info.id.clone(), "web", AgentId::from("agent-1"), Duration::MAX)
        .await
        .unwrap();

    assert_eq!(read(&catalog, &filters).await, 1.0);
    assert_eq!(allocator.get_status().await.unwrap().frameworks, 1);

    tokio::time::advance(Duration::from_secs(30 * 24 * 60 * 60)).await;
    assert_eq!(read(&catalog, &filters).await, 1.0);

    stop(allocator, task).await;
    assert_catalog_empty(&catalog);
}

#[tokio::test]
async fn test_revive_clears_offer_filters() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web"]);

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 4.0)]))
        .await
        .unwrap();
    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator
        .decline_offer(info.id.clone(), "web", AgentId::from("agent-1"), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(read(&catalog, &offer_filters_active_name("web")).await, 1.0);

    allocator.revive_roles(info.id.clone(), roles(&["web"])).await.unwrap();
    assert_eq!(read(&catalog, &offer_filters_active_name("web")).await, 0.0);

    stop(allocator, task).await;
}

#[tokio::test]
async fn test_record_resources_filtered() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &[]);
    let prefix = metric_prefix(&info);

    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator
        .record_resources_filtered(info.id.clone(), FilterReason::RegionAware)
        .await
        .unwrap();

    assert_eq!(
        read(&catalog, &resources_filtered_reason_name(&prefix, FilterReason::RegionAware)).await,
        1.0
    );

    let err = allocator
        .record_resources_filtered(FrameworkId::from("missing"), FilterReason::Decline)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocatorError::FrameworkNotFound(_)));

    stop(allocator, task).await;
}

// ============================================================================
// Request Validation
// ============================================================================

#[tokio::test]
async fn test_invalid_requests_leave_catalog_unchanged() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);
    let info = framework_info("fw-1", "spark", &["web"]);
    allocator.add_framework(info.clone(), BTreeSet::new()).await.unwrap();
    allocator.set_quota("web", quota(&[("cpus", 2.0)])).await.unwrap();
    let before = catalog.names();

    assert!(matches!(
        allocator.add_framework(info.clone(), BTreeSet::new()).await,
        Err(AllocatorError::Conflict(_))
    ));
    assert!(matches!(
        allocator.set_quota("web", quota(&[("cpus", 8.0)])).await,
        Err(AllocatorError::Conflict(_))
    ));
    assert!(matches!(
        allocator.remove_quota("batch").await,
        Err(AllocatorError::QuotaNotFound(_))
    ));
    assert!(matches!(
        allocator.remove_framework(FrameworkId::from("missing")).await,
        Err(AllocatorError::FrameworkNotFound(_))
    ));
    assert!(matches!(
        allocator
            .decline_offer(info.id.clone(), "web", AgentId::from("missing"), Duration::from_secs(1))
            .await,
        Err(AllocatorError::AgentNotFound(_))
    ));
    assert!(matches!(
        allocator.remove_agent(AgentId::from("missing")).await,
        Err(AllocatorError::AgentNotFound(_))
    ));

    assert_eq!(catalog.names(), before);
    // Guarantee still reflects the first quota
    assert_eq!(read(&catalog, &quota_guarantee_name("web", "cpus")).await, 2.0);

    stop(allocator, task).await;
}

#[tokio::test]
async fn test_status_reports_tracked_state() {
    let catalog = InMemoryCatalog::new();
    let (allocator, task) = spawn_allocator(&catalog);

    allocator
        .add_agent(AgentId::from("agent-1"), resources(&[("cpus", 1.0)]))
        .await
        .unwrap();
    allocator
        .add_framework(framework_info("fw-1", "a", &["web", "batch"]), BTreeSet::new())
        .await
        .unwrap();
    allocator
        .add_framework(framework_info("fw-2", "b", &["web"]), BTreeSet::new())
        .await
        .unwrap();
    allocator.set_quota("web", quota(&[("cpus", 1.0)])).await.unwrap();

    let status = allocator.get_status().await.unwrap();
    assert_eq!(status.agents, 1);
    assert_eq!(status.frameworks, 2);
    assert_eq!(status.tracked_roles, 2);
    assert_eq!(status.quota_roles, 1);
    assert_eq!(status.queue_depth, 0);

    stop(allocator, task).await;
}

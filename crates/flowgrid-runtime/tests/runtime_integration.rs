//! Runtime integration tests.
//!
//! Drives the orchestrator against real in-process pools: start, crash and
//! restart, estimator-driven scaling, and drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use flowgrid_core::{
    AutoscalerOptions, LogLevel, ProcessorGroup, ProcessorOptions, ProcessorType, RunId,
    RuntimeOptions, RuntimeStatus,
};
use flowgrid_pool::{LocalPoolFactory, PoolHandle, PoolSnapshot, ReplicaEstimator};
use flowgrid_runtime::{Runtime, RuntimeError};

const OPTIONS: &str = r#"
checkin_frequency_loop_secs = 1
log_level = "DEBUG"

[processor_options.ingest]
num_replicas = 2

[processor_options.ingest.autoscaler_options]
min_replicas = 1
max_replicas = 3
autoscale_frequency_secs = 10

[processor_options.collect]
num_replicas = 1

[processor_options.serve]
num_replicas = 4

[processor_options.serve.autoscaler_options]
enable_autoscaler = false
autoscale_frequency_secs = 10
"#;

fn options() -> RuntimeOptions {
    RuntimeOptions::from_toml_str(OPTIONS).unwrap()
}

fn groups() -> Vec<ProcessorGroup> {
    vec![
        ProcessorGroup::new("ingest", ProcessorType::Consumer),
        ProcessorGroup::new("collect", ProcessorType::Collector),
        ProcessorGroup::new("serve", ProcessorType::Endpoint),
    ]
}

fn start(factory: &LocalPoolFactory) -> Runtime {
    flowgrid_core::logging::init(LogLevel::Debug);
    Runtime::with_run_id(RunId::from("it-run"), options(), Arc::new(factory.clone())).unwrap()
}

async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn runtime_lifecycle_with_local_pools() {
    let factory = LocalPoolFactory::new();
    let runtime = start(&factory);
    assert_eq!(runtime.run_id().as_str(), "it-run");

    runtime.run(groups()).await.unwrap();
    settle().await;

    let snap = runtime.snapshot().await.unwrap();
    assert_eq!(snap.status, RuntimeStatus::Running);
    let replicas: Vec<_> = snap
        .processors
        .iter()
        .map(|p| (p.group_id.as_str(), p.status, p.num_replicas))
        .collect();
    assert_eq!(
        replicas,
        [
            ("ingest", RuntimeStatus::Running, 2),
            ("collect", RuntimeStatus::Running, 1),
            ("serve", RuntimeStatus::Running, 4),
        ]
    );

    assert!(runtime.drain().await.unwrap());
    assert_eq!(runtime.status().await.unwrap(), RuntimeStatus::Idle);

    let snap = runtime.snapshot().await.unwrap();
    assert!(
        snap.processors
            .iter()
            .all(|p| p.status == RuntimeStatus::Idle && p.num_replicas == 0)
    );

    runtime.run_until_complete().await;
    assert!(!runtime.is_active().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn terminated_pool_is_replaced() {
    let factory = LocalPoolFactory::new();
    let runtime = start(&factory);
    runtime.run(groups()).await.unwrap();
    settle().await;

    let original = factory.pools_for("collect").remove(0);
    original.terminate().await.unwrap();
    sleep(Duration::from_millis(1500)).await;

    // The dead pool has been dropped from the registry.
    let collect = factory.pools_for("collect");
    assert_eq!(collect.len(), 1);
    assert!(original.is_finished());
    assert!(!Arc::ptr_eq(&collect[0], &original));
    assert!(!collect[0].is_finished());
    assert_eq!(collect[0].status().await.unwrap(), RuntimeStatus::Running);

    let snap = runtime.snapshot().await.unwrap();
    let ids: Vec<_> = snap.processors.iter().map(|p| p.group_id.as_str()).collect();
    assert_eq!(ids, ["ingest", "collect", "serve"]);
    assert_eq!(factory.pools_for("ingest").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn estimator_drives_replica_count() {
    let estimator: ReplicaEstimator =
        Arc::new(|snapshot: &PoolSnapshot| -> anyhow::Result<u32> { Ok(snapshot.num_replicas + 5) });
    let factory = LocalPoolFactory::new().with_estimator(estimator);
    let runtime = start(&factory);
    runtime.run(groups()).await.unwrap();

    sleep(Duration::from_millis(9500)).await;
    let snap = runtime.snapshot().await.unwrap();
    assert_eq!(snap.processors[0].num_replicas, 2);

    sleep(Duration::from_secs(1)).await;
    let snap = runtime.snapshot().await.unwrap();
    let ingest = &snap.processors[0];
    // Clamped to max_replicas.
    assert_eq!(ingest.num_replicas, 3);
    assert_eq!(ingest.metrics["scale_events"], 1.0);

    // Autoscaling disabled for "serve": checked, never resized.
    let serve = &snap.processors[2];
    assert_eq!(serve.num_replicas, 4);
    assert_eq!(serve.metrics["scale_checks"], 1.0);
    assert_eq!(serve.metrics["scale_events"], 0.0);
}

#[tokio::test(start_paused = true)]
async fn failing_estimator_keeps_runtime_running() {
    let estimator: ReplicaEstimator = Arc::new(|_: &PoolSnapshot| -> anyhow::Result<u32> {
        anyhow::bail!("metrics backend unavailable")
    });
    let factory = LocalPoolFactory::new().with_estimator(estimator);
    let runtime = start(&factory);
    runtime.run(groups()).await.unwrap();

    sleep(Duration::from_millis(20_500)).await;
    assert_eq!(runtime.status().await.unwrap(), RuntimeStatus::Running);

    let snap = runtime.snapshot().await.unwrap();
    assert_eq!(snap.processors[0].num_replicas, 2);
    assert_eq!(snap.processors[0].metrics["scale_checks"], 2.0);
    assert_eq!(factory.pools().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn connection_groups_are_refused() {
    let factory = LocalPoolFactory::new();
    let options = options().with_processor_options("link", ProcessorOptions::default());
    let runtime = Runtime::new(options, Arc::new(factory.clone())).unwrap();

    let mut requested = groups();
    requested.push(ProcessorGroup::new("link", ProcessorType::Connection));
    let err = runtime.run(requested).await.unwrap_err();

    assert!(matches!(err, RuntimeError::UnsupportedGroupType(ProcessorType::Connection)));
    assert_eq!(runtime.status().await.unwrap(), RuntimeStatus::Idle);
    assert!(factory.pools().is_empty());
}

#[tokio::test(start_paused = true)]
async fn options_without_processor_entry_fail_run() {
    let factory = LocalPoolFactory::new();
    let options = RuntimeOptions::default().with_processor_options(
        "ingest",
        ProcessorOptions {
            autoscaler_options: AutoscalerOptions {
                autoscale_frequency_secs: 5.0,
                ..AutoscalerOptions::default()
            },
            ..ProcessorOptions::default()
        },
    );
    let runtime = Runtime::new(options, Arc::new(factory.clone())).unwrap();

    let err = runtime.run(groups()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));
    assert!(factory.pools().is_empty());
}

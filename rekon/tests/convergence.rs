//! End-to-end convergence scenarios against the in-memory store.
//!
//! Each test drives `reconcile` pass by pass and plays the outside controllers
//! by hand, asserting the exact store writes of every pass.

use std::time::Duration;

use rekon::reconciler::{Action, Context, reconcile};
use rekon::resource::{ConfigMap, DatabaseSchema, Deployment, Job, Kind, ObjectKey, Workload};
use rekon::store::{MemoryStore, ObjectStore, StoreCall, StoreError, Verb};
use rekon::{ReconcileConfig, ReconcileError, Resource, StandardTemplates};

const NS: &str = "prod";
const NAME: &str = "images";

fn workload() -> Workload {
    serde_json::from_value(serde_json::json!({
        "metadata": { "name": NAME, "namespace": NS },
        "spec": {
            "replicas": 3,
            "containerImage": "registry.local/image-api:1.0",
            "databaseHostname": "db.prod",
            "secret": "image-secret"
        }
    }))
    .unwrap()
}

fn key() -> ObjectKey {
    ObjectKey::new(NS, NAME)
}

fn job_key() -> ObjectKey {
    ObjectKey::new(NS, format!("{NAME}-db-sync"))
}

fn settle() -> Action {
    Action::requeue(Duration::from_secs(5))
}

fn rollout() -> Action {
    Action::requeue(Duration::from_secs(10))
}

/// Run one pass and return its action together with the writes it made.
async fn pass(store: &MemoryStore) -> (Action, Vec<(Verb, Kind)>) {
    let result = try_pass(store).await;
    let writes = writes(&store.take_calls().await);
    (result.expect("pass failed"), writes)
}

async fn try_pass(store: &MemoryStore) -> Result<Action, ReconcileError> {
    let config = ReconcileConfig::default();
    let ctx = Context {
        store,
        templates: &StandardTemplates,
        config: &config,
    };
    reconcile(&ctx, &key()).await
}

fn writes(calls: &[StoreCall]) -> Vec<(Verb, Kind)> {
    calls
        .iter()
        .filter(|c| c.verb.is_write())
        .map(|c| (c.verb, c.kind))
        .collect()
}

async fn complete_schema(store: &MemoryStore) {
    assert!(
        store
            .mutate::<DatabaseSchema>(&key(), |s| s.status.completed = true)
            .await
    );
}

async fn finish_job(store: &MemoryStore) {
    assert!(
        store
            .mutate::<Job>(&job_key(), |j| {
                j.status.active = 0;
                j.status.succeeded = 1;
            })
            .await
    );
}

async fn set_ready_replicas(store: &MemoryStore, ready: u32) {
    assert!(
        store
            .mutate::<Deployment>(&key(), |d| d.status.ready_replicas = ready)
            .await
    );
}

async fn set_image(store: &MemoryStore, image: &str) {
    let mut workload: Workload = store.peek(&key()).await.unwrap();
    workload.spec.container_image = image.to_string();
    store.update(workload.into_object()).await.unwrap();
    store.take_calls().await;
}

fn conflict(kind: Kind, key: ObjectKey) -> StoreError {
    StoreError::Conflict {
        kind,
        key,
        expected: 1,
        actual: 2,
    }
}

/// Drive a fresh workload all the way to convergence.
async fn converged_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;
    for _ in 0..3 {
        pass(&store).await;
    }
    complete_schema(&store).await;
    pass(&store).await;
    finish_job(&store).await;
    pass(&store).await;
    set_ready_replicas(&store, 3).await;
    let (action, _) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    store.take_calls().await;
    store
}

#[tokio::test]
async fn test_fresh_workload_converges_phase_by_phase() {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Create, Kind::PersistentVolumeClaim)]);

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Create, Kind::Service)]);

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(
        w,
        vec![
            (Verb::Create, Kind::ConfigMap),
            (Verb::UpdateStatus, Kind::Workload),
            (Verb::Create, Kind::DatabaseSchema),
        ]
    );

    // Schema not ready yet: nothing to do but wait.
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert!(w.is_empty());

    complete_schema(&store).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Create, Kind::Job)]);

    store
        .mutate::<Job>(&job_key(), |j| j.status.active = 1)
        .await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert!(w.is_empty());

    finish_job(&store).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::UpdateStatus, Kind::Workload),
            (Verb::Delete, Kind::Job),
            (Verb::Create, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
    assert!(store.peek::<Job>(&job_key()).await.is_none());

    set_ready_replicas(&store, 1).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert!(w.is_empty());

    set_ready_replicas(&store, 3).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert!(w.is_empty());

    let stored: Workload = store.peek(&key()).await.unwrap();
    assert!(stored.status.config_hash.is_some());
    assert!(stored.status.db_sync_hash.is_some());
    assert!(stored.status.deployment_hash.is_some());
}

#[tokio::test]
async fn test_converged_workload_is_idempotent() {
    let store = converged_store().await;

    for _ in 0..2 {
        let (action, w) = pass(&store).await;
        assert_eq!(action, Action::await_change());
        assert!(w.is_empty());
    }
}

#[tokio::test]
async fn test_missing_deployment_hash_reapplies_once() {
    let store = converged_store().await;
    store
        .mutate::<Workload>(&key(), |w| w.status.deployment_hash = None)
        .await;
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::Update, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );

    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert!(w.is_empty());
}

#[tokio::test]
async fn test_replica_change_only_touches_deployment() {
    let store = converged_store().await;
    let before: Workload = store.peek(&key()).await.unwrap();

    let mut scaled = before.clone();
    scaled.spec.replicas = 5;
    store.update(scaled.into_object()).await.unwrap();
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::Update, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );

    let after: Workload = store.peek(&key()).await.unwrap();
    assert_eq!(after.status.config_hash, before.status.config_hash);
    assert_eq!(after.status.db_sync_hash, before.status.db_sync_hash);
    assert_ne!(after.status.deployment_hash, before.status.deployment_hash);
    let deployment: Deployment = store.peek(&key()).await.unwrap();
    assert_eq!(deployment.spec.replicas, 5);

    // Waits for the new replicas, then settles.
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert!(w.is_empty());
    set_ready_replicas(&store, 5).await;
    let (action, _) = pass(&store).await;
    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn test_config_drift_is_repaired_once() {
    let store = converged_store().await;
    store
        .mutate::<ConfigMap>(&key(), |cm| {
            cm.data
                .insert("image-api.conf".to_string(), "tampered".to_string());
        })
        .await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Update, Kind::ConfigMap)]);

    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert!(w.is_empty());
}

#[tokio::test]
async fn test_config_change_rolls_out_deployment() {
    let store = converged_store().await;
    let before: Workload = store.peek(&key()).await.unwrap();
    let old_deployment: Deployment = store.peek(&key()).await.unwrap();

    let mut changed = before.clone();
    changed.spec.database_name = Some("images_v2".to_string());
    store.update(changed.into_object()).await.unwrap();
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(
        w,
        vec![
            (Verb::Update, Kind::ConfigMap),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );

    // The migration job's fingerprint does not cover the config hash, so the
    // next pass goes straight to the rollout.
    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::Update, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
    let new_deployment: Deployment = store.peek(&key()).await.unwrap();
    assert_ne!(
        new_deployment.spec.template.annotations,
        old_deployment.spec.template.annotations
    );
}

#[tokio::test]
async fn test_image_change_reruns_migration_before_rollout() {
    let store = converged_store().await;
    set_image(&store, "registry.local/image-api:2.0").await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Create, Kind::Job)]);
    let deployment: Deployment = store.peek(&key()).await.unwrap();
    assert_eq!(
        deployment.spec.template.containers[0].image,
        "registry.local/image-api:1.0"
    );

    finish_job(&store).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::UpdateStatus, Kind::Workload),
            (Verb::Delete, Kind::Job),
            (Verb::Update, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
}

#[tokio::test]
async fn test_interrupted_cleanup_is_finished_on_reentry() {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;
    for _ in 0..3 {
        pass(&store).await;
    }
    complete_schema(&store).await;
    pass(&store).await;
    finish_job(&store).await;

    // The hash gets recorded, then the pass dies on the job deletion.
    store
        .fail_next(
            Verb::Delete,
            Kind::Job,
            StoreError::Unavailable("connection reset".to_string()),
        )
        .await;
    let err = try_pass(&store).await.unwrap_err();
    assert!(err.is_transient());
    let stored: Workload = store.peek(&key()).await.unwrap();
    assert!(stored.status.db_sync_hash.is_some());
    assert!(store.peek::<Job>(&job_key()).await.is_some());
    store.take_calls().await;

    // Re-entry skips the job run but still removes the leftover job.
    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::Delete, Kind::Job),
            (Verb::Create, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
}

#[tokio::test]
async fn test_lost_db_sync_hash_write_reuses_finished_job() {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;
    for _ in 0..3 {
        pass(&store).await;
    }
    complete_schema(&store).await;
    pass(&store).await;
    finish_job(&store).await;

    // The job succeeded, but recording its hash fails.
    store
        .fail_next(
            Verb::UpdateStatus,
            Kind::Workload,
            StoreError::Unavailable("timeout".to_string()),
        )
        .await;
    assert!(try_pass(&store).await.is_err());
    assert!(store.peek::<Deployment>(&key()).await.is_none());
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert!(!w.contains(&(Verb::Create, Kind::Job)));
    assert_eq!(
        w.iter()
            .filter(|(_, kind)| *kind == Kind::Deployment)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_failed_migration_stops_progress() {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;
    for _ in 0..3 {
        pass(&store).await;
    }
    complete_schema(&store).await;
    pass(&store).await;
    store
        .mutate::<Job>(&job_key(), |j| j.status.failed = 1)
        .await;

    for _ in 0..2 {
        let err = try_pass(&store).await.unwrap_err();
        assert!(matches!(err, ReconcileError::JobFailed { .. }));
        assert!(!err.is_transient());
    }
    let w = writes(&store.take_calls().await);
    assert!(w.is_empty());
    assert!(store.peek::<Deployment>(&key()).await.is_none());
}

#[tokio::test]
async fn test_deleted_workload_ends_reconciliation() {
    let store = converged_store().await;
    store.delete(Kind::Workload, &key()).await.unwrap();
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert!(w.is_empty());
    assert!(store.peek::<Deployment>(&key()).await.is_none());
    assert!(store.peek::<ConfigMap>(&key()).await.is_none());
}

#[tokio::test]
async fn test_reverted_spec_leaves_running_migration_alone() {
    let store = converged_store().await;
    set_image(&store, "registry.local/image-api:2.0").await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, settle());
    assert_eq!(w, vec![(Verb::Create, Kind::Job)]);
    store
        .mutate::<Job>(&job_key(), |j| j.status.active = 1)
        .await;

    // Back to the applied image: nothing to run, but the job in flight for
    // the other image must not be killed.
    set_image(&store, "registry.local/image-api:1.0").await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert!(w.is_empty());
    let live: Job = store.peek(&job_key()).await.unwrap();
    assert_eq!(
        live.spec.template.containers[0].image,
        "registry.local/image-api:2.0"
    );

    // Cleaned up once it has finished.
    finish_job(&store).await;
    let (action, w) = pass(&store).await;
    assert_eq!(action, Action::await_change());
    assert_eq!(w, vec![(Verb::Delete, Kind::Job)]);
}

#[tokio::test]
async fn test_status_conflict_is_retried_without_duplicates() {
    let store = MemoryStore::new();
    store.insert(workload().into_object()).await;
    for _ in 0..3 {
        pass(&store).await;
    }
    complete_schema(&store).await;
    pass(&store).await;
    finish_job(&store).await;

    store
        .fail_next(
            Verb::UpdateStatus,
            Kind::Workload,
            conflict(Kind::Workload, key()),
        )
        .await;
    let err = try_pass(&store).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Store(StoreError::Conflict { .. })
    ));
    assert!(err.is_transient());
    assert!(store.peek::<Deployment>(&key()).await.is_none());
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::UpdateStatus, Kind::Workload),
            (Verb::Delete, Kind::Job),
            (Verb::Create, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
}

#[tokio::test]
async fn test_deployment_conflict_is_retried_on_next_pass() {
    let store = converged_store().await;
    let before: Workload = store.peek(&key()).await.unwrap();
    let mut scaled = before.clone();
    scaled.spec.replicas = 5;
    store.update(scaled.into_object()).await.unwrap();

    store
        .fail_next(Verb::Update, Kind::Deployment, conflict(Kind::Deployment, key()))
        .await;
    store.take_calls().await;
    let err = try_pass(&store).await.unwrap_err();
    assert!(err.is_transient());
    let deployment: Deployment = store.peek(&key()).await.unwrap();
    assert_eq!(deployment.spec.replicas, 3);
    let stored: Workload = store.peek(&key()).await.unwrap();
    assert_eq!(stored.status.deployment_hash, before.status.deployment_hash);
    store.take_calls().await;

    let (action, w) = pass(&store).await;
    assert_eq!(action, rollout());
    assert_eq!(
        w,
        vec![
            (Verb::Update, Kind::Deployment),
            (Verb::UpdateStatus, Kind::Workload),
        ]
    );
    let deployment: Deployment = store.peek(&key()).await.unwrap();
    assert_eq!(deployment.spec.replicas, 5);
}

//! Full sync cycle against the scripted backend

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;

use studysync::client::local_db::LAST_SYNC_KEY;
use studysync::client::notifications::Notification;
use studysync::client::sync::{CycleOutcome, SkipReason, SyncPhase};
use studysync::shared::{EntityType, SyncAction};

use crate::common::*;

fn uid(app: &TestApp) -> String {
    app.context.identity.current_uid().unwrap()
}

#[tokio::test]
async fn test_older_server_data_never_clobbers_local_edits() {
    let app = signed_in(remote_with_user(), false).await;
    let last_sync = app.context.sync.status().last_sync_at.unwrap();

    // newer than the last sync, so it is downloaded, but older than the edit below
    app.remote.set_entity(
        "tasks",
        json!([{"id": "t1", "title": "Stale"}]),
        last_sync + ChronoDuration::milliseconds(1),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    let local = json!([{"id": "t1", "title": "Fresh"}]);
    app.context.store.set("tasks", &local).await.unwrap();

    let outcome = app.context.sync.force_sync().await;
    let CycleOutcome::Completed(report) = outcome else {
        panic!("cycle did not complete");
    };
    assert!(!report.merged_entity_types.contains(&EntityType::Tasks));

    let tasks: Value = app.context.store.get("tasks").await.unwrap();
    assert_eq!(tasks, local);
    // the full snapshot upload pushed the local edit to the server
    assert_eq!(app.remote.entity("tasks").unwrap().data, local);
}

#[tokio::test]
async fn test_newer_server_data_replaces_local() {
    let app = signed_in(remote_with_user(), false).await;
    let first_sync = app.context.sync.status().last_sync_at.unwrap();

    app.context.store.set("goals", &json!([{"id": "g1", "completed": false}])).await.unwrap();
    let server_goals = json!([{"id": "g1", "completed": false}, {"id": "g2", "completed": false}]);
    app.remote
        .set_entity("goals", server_goals.clone(), Utc::now() + ChronoDuration::seconds(5));

    let outcome = app.context.sync.force_sync().await;
    assert!(outcome.is_completed());

    let goals: Value = app.context.store.get("goals").await.unwrap();
    assert_eq!(goals, server_goals);
    assert!(app.context.sync.status().last_sync_at.unwrap() > first_sync);
}

#[tokio::test]
async fn test_repeated_cycles_converge() {
    let app = signed_in(remote_with_user(), false).await;
    app.context
        .store
        .set("subjects", &json!([{"id": "s1", "name": "Chemistry"}]))
        .await
        .unwrap();

    assert!(app.context.sync.force_sync().await.is_completed());
    let uid = uid(&app);
    let before = app.context.store.snapshot_for(&uid, &EntityType::ALL).await.unwrap();
    let uploads = app.remote.upload_count();
    let downloads = app.remote.download_count();

    let outcome = app.context.sync.force_sync().await;
    let CycleOutcome::Completed(report) = outcome else {
        panic!("second cycle did not complete");
    };
    assert!(report.merged_entity_types.is_empty());
    assert_eq!(report.drained, 0);
    // one snapshot upload, no item deliveries
    assert_eq!(app.remote.upload_count(), uploads + 1);
    assert_eq!(app.remote.download_count(), downloads + 1);

    let after = app.context.store.snapshot_for(&uid, &EntityType::ALL).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(app.context.sync.status().pending_changes, 0);
}

#[tokio::test]
async fn test_offline_mutation_syncs_on_reconnect() {
    let app = signed_in(remote_with_user(), true).await;

    assert!(app.context.sync.set_network_available(false).await.is_none());
    let item = app
        .context
        .sync
        .enqueue(
            EntityType::Tasks,
            SyncAction::Update,
            json!({"id": "t1", "title": "Read", "completed": true}),
        )
        .await
        .unwrap();
    assert_eq!(app.context.sync.status().pending_changes, 1);
    assert!(!app.context.sync.status().is_online);

    let started_before = app.context.sync.metrics().cycles_started;
    let outcome = app.context.sync.set_network_available(true).await;
    assert!(outcome.is_some_and(|outcome| outcome.is_completed()));

    let status = app.context.sync.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.pending_changes, 0);
    assert!(status.last_sync_at.unwrap() >= item.enqueued_at);
    assert_eq!(app.context.sync.metrics().cycles_started, started_before + 1);
    assert_eq!(app.remote.delivered_items(), vec![item.id]);
}

#[tokio::test]
async fn test_failed_pings_keep_timer_from_syncing() {
    let app = signed_in(remote_with_user(), false).await;
    app.remote.set_reachable(false);
    let started_before = app.context.sync.metrics().cycles_started;

    for _ in 0..3 {
        assert_eq!(
            app.context.sync.on_timer().await,
            CycleOutcome::Skipped(SkipReason::Offline)
        );
        assert!(!app.context.sync.status().is_online);
    }

    assert_eq!(app.context.sync.metrics().cycles_started, started_before);
    assert_eq!(app.context.sync.status().phase, SyncPhase::Idle);
}

#[tokio::test]
async fn test_sign_out_stops_cycle_writes() {
    let app = signed_in(remote_with_user(), false).await;
    let uid = uid(&app);
    let last_sync_before = app.context.store.get_entry_for(&uid, LAST_SYNC_KEY).await.unwrap();

    app.context
        .sync
        .enqueue(EntityType::Notes, SyncAction::Create, json!({"id": "n1"}))
        .await
        .unwrap();
    app.remote.set_upload_delay(Duration::from_millis(200));

    let sync = app.context.sync.clone();
    let cycle = tokio::spawn(async move { sync.force_sync().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.context.auth.sign_out().await.unwrap();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Skipped(SkipReason::IdentityChanged)
    );
    let last_sync_after = app.context.store.get_entry_for(&uid, LAST_SYNC_KEY).await.unwrap();
    assert_eq!(last_sync_before, last_sync_after);
    assert!(app.context.identity.current().is_none());
}

#[tokio::test]
async fn test_enqueue_triggers_background_cycle() {
    let app = signed_in(remote_with_user(), true).await;
    let first_sync = app.context.sync.status().last_sync_at.unwrap();

    let item = app
        .context
        .sync
        .enqueue(EntityType::Sessions, SyncAction::Create, json!({"id": "s1", "minutes": 25}))
        .await
        .unwrap();

    let status = wait_for_status(&app, |status| {
        status.pending_changes == 0 && status.last_sync_at.is_some_and(|at| at > first_sync) && !status.is_syncing
    })
    .await;
    assert!(status.error.is_none());
    assert_eq!(app.remote.delivered_items(), vec![item.id]);
}

#[tokio::test]
async fn test_dropped_items_surface_and_cycle_recovers() {
    let app = signed_in(remote_with_user(), false).await;
    app.context
        .sync
        .enqueue(EntityType::Challenges, SyncAction::Update, json!({"id": "c1"}))
        .await
        .unwrap();

    app.remote.fail_all_uploads(true);
    for _ in 0..3 {
        assert!(matches!(app.context.sync.force_sync().await, CycleOutcome::Failed(_)));
    }
    let status = app.context.sync.status();
    assert_eq!(status.phase, SyncPhase::Error);
    assert_eq!(status.pending_changes, 0, "item dropped after three attempts");
    assert_eq!(app.context.sync.metrics().items_dropped, 1);

    app.remote.fail_all_uploads(false);
    assert!(app.context.sync.force_sync().await.is_completed());
    let status = app.context.sync.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status.error.is_none());
    assert!(app.remote.delivered_items().is_empty());
}

#[tokio::test]
async fn test_partial_drain_failure_keeps_later_items_moving() {
    let app = signed_in(remote_with_user(), false).await;
    let first = app
        .context
        .sync
        .enqueue(EntityType::Tasks, SyncAction::Create, json!({"id": "t1"}))
        .await
        .unwrap();
    let second = app
        .context
        .sync
        .enqueue(EntityType::Tasks, SyncAction::Create, json!({"id": "t2"}))
        .await
        .unwrap();

    app.remote.fail_next_uploads(1);
    let report = app.context.sync.drain().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.retried, 1);
    assert_eq!(app.remote.delivered_items(), vec![second.id]);

    let pending = app.context.sync.pending_items().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(pending[0].retry_count, 1);
}

#[tokio::test]
async fn test_merge_fires_goal_notification() {
    let app = signed_in(remote_with_user(), false).await;
    app.context
        .store
        .set("goals", &json!([{"id": "g1", "title": "Finish thesis", "completed": false}]))
        .await
        .unwrap();
    app.remote.set_entity(
        "goals",
        json!([{"id": "g1", "title": "Finish thesis", "completed": true}]),
        Utc::now() + ChronoDuration::seconds(5),
    );

    assert!(app.context.sync.force_sync().await.is_completed());

    let delivered = app.notifier.delivered.lock().unwrap().clone();
    assert_eq!(
        delivered,
        vec![Notification::GoalCompleted {
            goal_id: "g1".into(),
            title: Some("Finish thesis".into()),
        }]
    );
}

#[tokio::test]
async fn test_cycle_waits_for_running_drain() {
    let app = signed_in(remote_with_user(), false).await;
    let item = app
        .context
        .sync
        .enqueue(EntityType::Goals, SyncAction::Update, json!({"id": "g1", "completed": true}))
        .await
        .unwrap();
    app.remote.set_upload_delay(Duration::from_millis(200));

    let sync = app.context.sync.clone();
    let drain = tokio::spawn(async move { sync.drain().await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let outcome = app.context.sync.force_sync().await;
    let CycleOutcome::Completed(report) = outcome else {
        panic!("cycle did not complete: {:?}", outcome);
    };
    assert_eq!(report.drained, 0);

    let drained = drain.await.unwrap().unwrap();
    assert_eq!(drained.delivered, 1);
    assert!(!drained.skipped);

    let status = app.context.sync.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status.error.is_none());
    assert_eq!(status.pending_changes, 0);
    assert_eq!(app.remote.delivered_items(), vec![item.id]);
}

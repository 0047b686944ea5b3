//! Sign-in, local fallback and session restore

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

use studysync::client::error::{ApiError, AuthError};
use studysync::client::local_db::IDENTITY_KEY;
use studysync::client::sync::{CycleOutcome, SkipReason};
use studysync::client::Identity;

use crate::common::*;

const OTHER_EMAIL: &str = "alex@example.com";
const OTHER_PASSWORD: &str = "hunter22";
const OTHER_UID: &str = "remote-alex";

fn two_user_remote() -> Arc<ScriptedRemote> {
    Arc::new(
        ScriptedRemote::new()
            .with_user(EMAIL, PASSWORD, REMOTE_UID)
            .with_user(OTHER_EMAIL, OTHER_PASSWORD, OTHER_UID),
    )
}

async fn sign_in_and_settle(app: &TestApp, email: &str, password: &str) -> Identity {
    let identity = app.context.auth.sign_in(email, password).await.unwrap();
    wait_for_status(app, |status| {
        status.last_sync_at.is_some() && status.pending_changes == 0 && !status.is_syncing
    })
    .await;
    identity
}

#[tokio::test]
async fn test_remote_sign_in_persists_identity_and_credentials() {
    let app = signed_in(remote_with_user(), false).await;

    let identity = app.context.identity.current().unwrap();
    assert_eq!(identity.uid, REMOTE_UID);
    assert!(identity.is_from_remote);

    let persisted: Option<Identity> = app.context.store.get_global(IDENTITY_KEY).await.unwrap();
    assert_eq!(persisted, Some(identity));

    let account = app.context.auth.accounts().find(EMAIL).await.unwrap().unwrap();
    assert_eq!(account.uid, REMOTE_UID);
    assert!(account.remote);

    let state = app.context.auth.state().await;
    assert!(state.is_authenticated());
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_offline_sign_in_falls_back_to_local_record() {
    let app = signed_in(remote_with_user(), false).await;
    app.context.auth.sign_out().await.unwrap();
    app.remote.set_reachable(false);

    let identity = app.context.auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(identity.uid, REMOTE_UID);
    assert!(!identity.is_from_remote);

    // local-only identities never sync
    assert_eq!(
        app.context.sync.force_sync().await,
        CycleOutcome::Skipped(SkipReason::LocalIdentity)
    );
}

#[tokio::test]
async fn test_offline_sign_in_rejects_wrong_password_and_unknown_email() {
    let app = signed_in(remote_with_user(), false).await;
    app.context.auth.sign_out().await.unwrap();
    app.remote.set_reachable(false);

    let wrong_password = app.context.auth.sign_in(EMAIL, "wrong").await;
    assert_matches!(wrong_password, Err(AuthError::Remote(ApiError::Network(_))));

    let other_email = app.context.auth.sign_in(OTHER_EMAIL, PASSWORD).await;
    assert_matches!(other_email, Err(AuthError::Remote(ApiError::Network(_))));

    assert!(app.context.identity.current().is_none());
    let state = app.context.auth.state().await;
    assert_eq!(
        state.error.as_deref(),
        Some("Could not reach the server, check your connection")
    );
}

#[tokio::test]
async fn test_rejected_credentials_without_local_record() {
    let app = test_app(remote_with_user(), false).await;

    let result = app.context.auth.sign_in("nobody@example.com", "whatever").await;
    assert_matches!(result, Err(AuthError::Rejected(ref message)) if message == "Invalid email or password");
    assert_eq!(
        app.context.auth.state().await.error.as_deref(),
        Some("Invalid email or password")
    );
}

#[tokio::test]
async fn test_invalid_input_never_reaches_backend() {
    let app = test_app(remote_with_user(), false).await;

    let result = app.context.auth.sign_in("not-an-email", PASSWORD).await;
    assert_matches!(result, Err(AuthError::InvalidInput { field: "email", .. }));
    assert_eq!(app.remote.ping_count(), 0);
}

#[tokio::test]
async fn test_offline_sign_up_creates_local_account() {
    let remote = remote_with_user();
    remote.set_reachable(false);
    let app = test_app(remote, false).await;

    let identity = app
        .context
        .auth
        .sign_up("new@example.com", "s3cret", Some("New".into()))
        .await
        .unwrap();
    assert!(identity.uid.starts_with("local-"));
    assert!(!identity.is_from_remote);
    assert_eq!(identity.display_name.as_deref(), Some("New"));

    app.context.auth.sign_out().await.unwrap();
    let again = app.context.auth.sign_in("new@example.com", "s3cret").await.unwrap();
    assert_eq!(again.uid, identity.uid);

    // the same email cannot be registered locally twice
    app.context.auth.sign_out().await.unwrap();
    let duplicate = app.context.auth.sign_up("new@example.com", "other", None).await;
    assert_matches!(duplicate, Err(AuthError::Rejected(_)));
}

#[tokio::test]
async fn test_device_only_sign_out_discards_pending_mutations() {
    let remote = remote_with_user();
    remote.set_reachable(false);
    let app = test_app(remote, false).await;

    app.context.auth.sign_up("new@example.com", "s3cret", None).await.unwrap();
    app.context
        .sync
        .enqueue(
            studysync::shared::EntityType::Tasks,
            studysync::shared::SyncAction::Create,
            json!({"id": "t1"}),
        )
        .await
        .unwrap();
    assert_eq!(app.context.sync.status().pending_changes, 1);

    app.context.auth.sign_out().await.unwrap();
    app.context.auth.sign_in("new@example.com", "s3cret").await.unwrap();
    assert!(app.context.sync.pending_items().await.is_empty());
}

#[tokio::test]
async fn test_remote_sign_up_conflict() {
    let app = test_app(remote_with_user(), false).await;

    let result = app.context.auth.sign_up(EMAIL, "anything", None).await;
    assert_matches!(result, Err(AuthError::Remote(ApiError::Http { status: 409, .. })));
    assert_eq!(
        app.context.auth.state().await.error.as_deref(),
        Some("This email is already registered")
    );
}

#[tokio::test]
async fn test_provider_sign_in() {
    let app = test_app(remote_with_user(), false).await;

    let unsupported = app.context.auth.sign_in_with_provider("github", GOOGLE_TOKEN).await;
    assert_matches!(unsupported, Err(AuthError::InvalidInput { field: "provider", .. }));

    let identity = app
        .context
        .auth
        .sign_in_with_provider("google", GOOGLE_TOKEN)
        .await
        .unwrap();
    assert_eq!(identity.uid, "google-1");
    assert!(identity.is_from_remote);
    // provider sign-ins have no password to remember locally
    assert!(app.context.auth.accounts().find("g@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_users_never_see_each_others_data() {
    let app = test_app(two_user_remote(), false).await;

    sign_in_and_settle(&app, EMAIL, PASSWORD).await;
    let sam_tasks = json!([{"id": "t1", "title": "Sam's task"}]);
    app.context.store.set("tasks", &sam_tasks).await.unwrap();
    assert!(app.context.sync.force_sync().await.is_completed());
    app.context.auth.sign_out().await.unwrap();

    sign_in_and_settle(&app, OTHER_EMAIL, OTHER_PASSWORD).await;
    let tasks: Value = app.context.store.get("tasks").await.unwrap();
    assert_eq!(tasks, Value::Null);
    let alex_tasks = json!([{"id": "t9", "title": "Alex's task"}]);
    app.context.store.set("tasks", &alex_tasks).await.unwrap();
    app.context.auth.sign_out().await.unwrap();

    sign_in_and_settle(&app, EMAIL, PASSWORD).await;
    let tasks: Value = app.context.store.get("tasks").await.unwrap();
    assert_eq!(tasks, sam_tasks);
}

#[tokio::test]
async fn test_queue_stays_with_its_owner() {
    let app = test_app(two_user_remote(), false).await;

    sign_in_and_settle(&app, EMAIL, PASSWORD).await;
    let item = app
        .context
        .sync
        .enqueue(
            studysync::shared::EntityType::Notes,
            studysync::shared::SyncAction::Create,
            json!({"id": "n1", "body": "Mitochondria"}),
        )
        .await
        .unwrap();
    app.context.auth.sign_out().await.unwrap();

    sign_in_and_settle(&app, OTHER_EMAIL, OTHER_PASSWORD).await;
    assert!(app.context.sync.pending_items().await.is_empty());
    assert!(app.remote.delivered_items().is_empty());
    app.context.auth.sign_out().await.unwrap();

    // back under the original owner, the sign-in cycle delivers it
    app.context.auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    wait_for_status(&app, |status| status.pending_changes == 0 && !status.is_syncing).await;
    assert_eq!(app.remote.delivered_items(), vec![item.id]);
}

#[tokio::test]
async fn test_restore_session_revalidates_remote_identity() {
    let first = signed_in(remote_with_user(), false).await;
    first.remote.expire_token(false);

    let app = test_app_with_store(first.remote.clone(), first.context.store.clone(), false);
    let restored = app.context.auth.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.uid, REMOTE_UID);
    assert!(restored.is_from_remote);
    assert_eq!(app.context.identity.current(), Some(restored));
}

#[tokio::test]
async fn test_restore_session_downgrades_when_refresh_fails() {
    let first = signed_in(remote_with_user(), false).await;
    first.remote.expire_token(true);

    let app = test_app_with_store(first.remote.clone(), first.context.store.clone(), false);
    let restored = app.context.auth.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.uid, REMOTE_UID);
    assert!(!restored.is_from_remote);

    let persisted: Option<Identity> = app.context.store.get_global(IDENTITY_KEY).await.unwrap();
    assert_eq!(persisted, Some(restored));
}

#[tokio::test]
async fn test_restore_session_keeps_remote_identity_while_unreachable() {
    let first = signed_in(remote_with_user(), false).await;
    first.remote.set_reachable(false);

    let app = test_app_with_store(first.remote.clone(), first.context.store.clone(), false);
    let restored = app.context.auth.restore_session().await.unwrap().unwrap();
    assert!(restored.is_from_remote);
    assert_eq!(
        app.context.sync.force_sync().await,
        CycleOutcome::Skipped(SkipReason::Offline)
    );
}

#[tokio::test]
async fn test_restore_without_session() {
    let app = test_app(remote_with_user(), false).await;
    assert_eq!(app.context.auth.restore_session().await.unwrap(), None);
    assert!(!app.context.auth.state().await.is_authenticated());
}

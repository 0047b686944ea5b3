//! Context builders and waiting helpers

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use studysync::client::notifications::{Notification, Notifier, NotifyError};
use studysync::client::{AppContext, Config, LocalStore, SyncStatus};
use studysync::shared::AppConfig;

use super::scripted_remote::ScriptedRemote;

pub const EMAIL: &str = "sam@example.com";
pub const PASSWORD: &str = "correct horse";
pub const REMOTE_UID: &str = "remote-sam";

/// Notifier that remembers everything it was asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub context: AppContext,
    pub remote: Arc<ScriptedRemote>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Backend that knows one user, `EMAIL` / `PASSWORD`
pub fn remote_with_user() -> Arc<ScriptedRemote> {
    Arc::new(ScriptedRemote::new().with_user(EMAIL, PASSWORD, REMOTE_UID))
}

pub async fn test_app(remote: Arc<ScriptedRemote>, sync_on_enqueue: bool) -> TestApp {
    test_app_with_store(remote, LocalStore::in_memory().await.unwrap(), sync_on_enqueue)
}

pub fn test_app_with_store(remote: Arc<ScriptedRemote>, store: LocalStore, sync_on_enqueue: bool) -> TestApp {
    let app_config = AppConfig::builder()
        .local_password_cost(4)
        .sync_on_enqueue(sync_on_enqueue)
        .build()
        .unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let context = AppContext::with_parts(
        Config::from_app(app_config),
        store,
        remote.clone(),
        notifier.clone(),
    );
    TestApp {
        context,
        remote,
        notifier,
    }
}

/// Sign in remotely and wait for the sign-in cycle to finish
pub async fn signed_in(remote: Arc<ScriptedRemote>, sync_on_enqueue: bool) -> TestApp {
    let app = test_app(remote, sync_on_enqueue).await;
    app.context.auth.sign_in(EMAIL, PASSWORD).await.unwrap();
    wait_for_status(&app, |status| status.last_sync_at.is_some() && !status.is_syncing).await;
    app
}

/// Wait (bounded) until the orchestrator status satisfies `predicate`
pub async fn wait_for_status(app: &TestApp, predicate: impl FnMut(&SyncStatus) -> bool) -> SyncStatus {
    let mut rx = app.context.sync.subscribe();
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for sync status")
        .expect("status channel closed")
        .clone();
    status
}

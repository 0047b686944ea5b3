//! Application context
//!
//! Explicitly constructed owner of every long-lived service: configuration,
//! local store, API client, sync orchestrator and auth resolver. Whatever
//! drives the app holds one `AppContext` and passes references down; nothing
//! is reachable through globals.

use std::sync::Arc;

use crate::client::api_client::{ApiClient, RemoteApi};
use crate::client::auth::AuthResolver;
use crate::client::config::Config;
use crate::client::error::StoreResult;
use crate::client::identity::IdentityHandle;
use crate::client::local_db::LocalStore;
use crate::client::notifications::{LogNotifier, Notifier};
use crate::client::sync::{SyncConfig, SyncOrchestrator};

pub struct AppContext {
    pub config: Config,
    pub store: LocalStore,
    pub api: Arc<dyn RemoteApi>,
    pub identity: IdentityHandle,
    pub sync: SyncOrchestrator,
    pub auth: AuthResolver,
}

impl AppContext {
    /// Open the configured store and wire up the production services
    pub async fn new(config: Config) -> StoreResult<Self> {
        let path = config.database_path();
        tracing::info!(path = %path.display(), "Opening local store");
        let store = LocalStore::open(&path).await?;
        let api: Arc<dyn RemoteApi> = Arc::new(ApiClient::new(config.app(), store.clone()));
        Ok(Self::with_parts(config, store, api, Arc::new(LogNotifier)))
    }

    /// Wire services around an existing store and transport
    pub fn with_parts(
        config: Config,
        store: LocalStore,
        api: Arc<dyn RemoteApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let identity = IdentityHandle::new();
        let sync = SyncOrchestrator::new(
            SyncConfig::from(config.app()),
            store.clone(),
            Arc::clone(&api),
            identity.clone(),
            notifier,
        );
        let auth = AuthResolver::new(
            store.clone(),
            Arc::clone(&api),
            identity.clone(),
            sync.clone(),
            config.app().local_password_cost,
        );

        Self {
            config,
            store,
            api,
            identity,
            sync,
            auth,
        }
    }

    /// Start background sync
    pub async fn start(&self) {
        self.sync.start().await;
    }

    /// Stop background sync after any cycle in progress
    pub async fn shutdown(&self) {
        self.sync.stop().await;
    }
}

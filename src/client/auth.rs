/**
 * Authentication Module
 *
 * Resolves the current identity: remote-backed when the backend accepts
 * the credentials, local-only when it cannot be reached (or rejects) and a
 * matching local credential record exists.
 *
 * The resolver is the only writer of the identity handle. Every change is
 * pushed to the local store namespace, the sync orchestrator (queue owner,
 * status) and durable storage, in that order.
 */

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::client::api_client::RemoteApi;
use crate::client::error::{ApiError, AuthError, AuthResult};
use crate::client::identity::IdentityHandle;
use crate::client::local_auth::{is_local_only_uid, normalize_email, LocalAccount, LocalAccounts};
use crate::client::local_db::{LocalStore, IDENTITY_KEY};
use crate::client::sync::{SyncOrchestrator, SyncTrigger};
use crate::client::types::{AuthResponse, Identity, LoginRequest, ProviderLoginRequest, SignupRequest};

/// Identity providers accepted by `sign_in_with_provider`
pub const SUPPORTED_PROVIDERS: &[&str] = &["google"];

/// Authentication state snapshot for display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    /// Last connectivity probe succeeded
    pub connected: bool,
    /// Last user-facing auth error
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

pub struct AuthResolver {
    store: LocalStore,
    api: Arc<dyn RemoteApi>,
    identity: IdentityHandle,
    orchestrator: SyncOrchestrator,
    accounts: LocalAccounts,
    last_error: RwLock<Option<String>>,
}

impl AuthResolver {
    pub fn new(
        store: LocalStore,
        api: Arc<dyn RemoteApi>,
        identity: IdentityHandle,
        orchestrator: SyncOrchestrator,
        password_cost: u32,
    ) -> Self {
        Self {
            accounts: LocalAccounts::new(store.clone(), password_cost),
            store,
            api,
            identity,
            orchestrator,
            last_error: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.identity.current()
    }

    pub async fn state(&self) -> AuthState {
        AuthState {
            identity: self.identity.current(),
            connected: self.orchestrator.status().is_online,
            error: self.last_error.read().await.clone(),
        }
    }

    pub fn accounts(&self) -> &LocalAccounts {
        &self.accounts
    }

    /// Register with the backend; creates a local-only account when the
    /// backend cannot be reached
    pub async fn sign_up(&self, email: &str, password: &str, name: Option<String>) -> AuthResult<Identity> {
        let result = self.try_sign_up(email, password, name).await;
        self.record(&result).await;
        result
    }

    async fn try_sign_up(&self, email: &str, password: &str, name: Option<String>) -> AuthResult<Identity> {
        validate_credentials(email, password)?;

        let request = SignupRequest {
            email: normalize_email(email),
            password: password.to_string(),
            name: name.clone(),
        };

        match self.api.sign_up(&request).await {
            Ok(response) => self.adopt_remote(response, Some(password)).await,
            Err(e) if e.is_transport() => {
                tracing::warn!(error = %e, "Backend unreachable, creating local-only account");
                let account = self.accounts.create_local(email, password, name).await?;
                self.adopt_local(account).await
            }
            Err(e) => Err(AuthError::Remote(e)),
        }
    }

    /// Sign in remotely, falling back to the local record for the same email
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let result = self.try_sign_in(email, password).await;
        self.record(&result).await;
        result
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        validate_credentials(email, password)?;

        let request = LoginRequest {
            email: normalize_email(email),
            password: password.to_string(),
        };

        let remote_err = match self.api.sign_in(&request).await {
            Ok(response) => return self.adopt_remote(response, Some(password)).await,
            Err(e) => e,
        };

        tracing::info!(error = %remote_err, "Remote sign-in failed, trying local credentials");
        match self.accounts.verify(email, password).await? {
            Some(account) => {
                tracing::warn!(uid = %account.uid, "Signed in with local credentials only");
                self.adopt_local(account).await
            }
            None if remote_err.is_transport() => Err(AuthError::Remote(remote_err)),
            None if matches!(remote_err, ApiError::Http { status: 400 | 401 | 403 | 404, .. }) => {
                Err(AuthError::Rejected("Invalid email or password".to_string()))
            }
            None => Err(AuthError::Remote(remote_err)),
        }
    }

    /// Sign in with a third-party identity token; remote only
    pub async fn sign_in_with_provider(&self, provider: &str, id_token: &str) -> AuthResult<Identity> {
        let result = self.try_sign_in_with_provider(provider, id_token).await;
        self.record(&result).await;
        result
    }

    async fn try_sign_in_with_provider(&self, provider: &str, id_token: &str) -> AuthResult<Identity> {
        if !SUPPORTED_PROVIDERS.contains(&provider) {
            return Err(AuthError::invalid("provider", format!("Unsupported sign-in provider '{}'", provider)));
        }
        if id_token.trim().is_empty() {
            return Err(AuthError::invalid("id_token", "Missing identity token"));
        }

        let request = ProviderLoginRequest {
            id_token: id_token.to_string(),
        };
        let response = self.api.sign_in_with_provider(provider, &request).await?;
        self.adopt_remote(response, None).await
    }

    /// Clear the identity, then tell the backend
    ///
    /// The handle is cleared first so a cycle in flight stops before its next
    /// write. The signed-out user's queue stays persisted under their uid,
    /// unless the account is device-only and could never deliver it.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let previous = self.identity.replace(None);
        if previous.as_ref().is_some_and(|identity| is_local_only_uid(&identity.uid)) {
            self.orchestrator.discard_pending().await?;
        }
        self.store.switch_identity(None).await;
        self.orchestrator.identity_changed().await?;
        self.store.delete_global(IDENTITY_KEY).await?;
        *self.last_error.write().await = None;

        if let Err(e) = self.api.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed, token discarded locally");
        }
        if let Some(previous) = previous {
            tracing::info!(uid = %previous.uid, "Signed out");
        }
        Ok(())
    }

    /// Connectivity probe; no data is touched
    pub async fn check_connection(&self) -> bool {
        self.orchestrator.check_connection().await
    }

    /// Reload the persisted identity at start-up
    ///
    /// A remote identity is validated against `/auth/me`. An expired token is
    /// refreshed once; if that fails the session is downgraded to a local
    /// identity with the same uid rather than signed out. An unreachable
    /// backend keeps the remote identity; sync stays gated on connectivity.
    pub async fn restore_session(&self) -> AuthResult<Option<Identity>> {
        let Some(persisted) = self.store.get_global::<Identity>(IDENTITY_KEY).await? else {
            tracing::debug!("No persisted session");
            return Ok(None);
        };

        if !persisted.is_from_remote {
            self.adopt(persisted.clone()).await?;
            tracing::info!(uid = %persisted.uid, "Restored local session");
            return Ok(Some(persisted));
        }

        if !self.api.restore_token().await {
            tracing::warn!(uid = %persisted.uid, "No token for remote session, continuing locally");
            return self.downgrade(persisted).await.map(Some);
        }

        self.adopt(persisted.clone()).await?;

        let validated = match self.api.get_current_user().await {
            Ok(user) => Ok(user),
            Err(ApiError::Http { status: 401, .. }) => match self.api.refresh_token().await {
                Ok(_) => self.api.get_current_user().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match validated {
            Ok(user) if user.id == persisted.uid => {
                let identity = Identity::remote(&user);
                if identity != persisted {
                    self.adopt(identity.clone()).await?;
                }
                tracing::info!(uid = %identity.uid, "Restored remote session");
                self.orchestrator.spawn_cycle(SyncTrigger::SignIn);
                Ok(Some(identity))
            }
            Ok(user) => {
                tracing::warn!(expected = %persisted.uid, got = %user.id, "Token belongs to another user");
                self.downgrade(persisted).await.map(Some)
            }
            Err(e) if e.is_transport() => {
                tracing::info!(error = %e, "Backend unreachable, keeping remote session offline");
                Ok(Some(persisted))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session could not be validated, continuing locally");
                self.downgrade(persisted).await.map(Some)
            }
        }
    }

    async fn adopt_remote(&self, response: AuthResponse, password: Option<&str>) -> AuthResult<Identity> {
        let identity = Identity::remote(&response.user);

        if let Some(password) = password {
            if let Err(e) = self
                .accounts
                .remember(&identity.email, password, &identity.uid, identity.display_name.clone())
                .await
            {
                tracing::warn!(error = %e, "Could not store local credentials");
            }
        }

        self.adopt(identity.clone()).await?;
        tracing::info!(uid = %identity.uid, "Signed in remotely");
        self.orchestrator.spawn_cycle(SyncTrigger::SignIn);
        Ok(identity)
    }

    async fn adopt_local(&self, account: LocalAccount) -> AuthResult<Identity> {
        let identity = Identity::local(account.uid, account.email, account.display_name);
        self.adopt(identity.clone()).await?;
        Ok(identity)
    }

    async fn downgrade(&self, identity: Identity) -> AuthResult<Identity> {
        let local = Identity::local(identity.uid, identity.email, identity.display_name);
        self.adopt(local.clone()).await?;
        Ok(local)
    }

    async fn adopt(&self, identity: Identity) -> AuthResult<()> {
        self.identity.replace(Some(identity.clone()));
        self.store.switch_identity(Some(&identity)).await;
        self.orchestrator.identity_changed().await?;
        self.store.set_global(IDENTITY_KEY, &identity).await?;
        Ok(())
    }

    async fn record<T>(&self, result: &AuthResult<T>) {
        *self.last_error.write().await = result.as_ref().err().map(AuthError::user_message);
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::invalid("email", "Please enter a valid email address"));
    }
    if password.is_empty() {
        return Err(AuthError::invalid("password", "Password is required"));
    }
    Ok(())
}

/**
 * Remote API Client
 *
 * Authenticated HTTP calls to the companion backend. `RemoteApi` is the seam
 * the sync core and the auth resolver depend on; `ApiClient` is the reqwest
 * implementation.
 *
 * Every call is bounded by the configured timeout. Timeouts, transport
 * failures and non-2xx statuses are reported as distinct `ApiError` kinds.
 * Auth calls are never retried here; only an explicit user action retries.
 */

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::client::error::{ApiError, ApiResult};
use crate::client::local_db::{LocalStore, TOKEN_KEY};
use crate::client::types::{
    AuthResponse, LoginRequest, ProviderLoginRequest, RefreshResponse, SignupRequest, SyncDownloadResponse,
    SyncUploadRequest, SyncUploadResponse, UserInfo,
};
use crate::shared::AppConfig;

/// Companion backend operations used by the sync core
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn sign_up(&self, request: &SignupRequest) -> ApiResult<AuthResponse>;

    async fn sign_in(&self, request: &LoginRequest) -> ApiResult<AuthResponse>;

    /// Sign in with a third-party identity token (`provider` names the
    /// endpoint, e.g. `google`)
    async fn sign_in_with_provider(&self, provider: &str, request: &ProviderLoginRequest) -> ApiResult<AuthResponse>;

    /// Drops the held token even when the remote call fails
    async fn sign_out(&self) -> ApiResult<()>;

    async fn get_current_user(&self) -> ApiResult<UserInfo>;

    /// Exchange the held token for a fresh one; returns the new token
    async fn refresh_token(&self) -> ApiResult<String>;

    async fn upload_sync(&self, request: &SyncUploadRequest) -> ApiResult<SyncUploadResponse>;

    /// Server-side changes since `since`, or everything when `None`
    async fn download_sync(&self, since: Option<DateTime<Utc>>) -> ApiResult<SyncDownloadResponse>;

    /// Connectivity probe; the only source of the "connected" flag
    async fn ping(&self) -> bool;

    /// Load a persisted bearer token; returns whether one was found
    async fn restore_token(&self) -> bool;

    async fn has_token(&self) -> bool;
}

/// `/auth/me` answers either `{ "user": {...} }` or the bare user
#[derive(Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Wrapped { user: UserInfo },
    Bare(UserInfo),
}

impl From<MeResponse> for UserInfo {
    fn from(response: MeResponse) -> Self {
        match response {
            MeResponse::Wrapped { user } | MeResponse::Bare(user) => user,
        }
    }
}

/// reqwest-backed `RemoteApi`
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    token: RwLock<Option<String>>,
    store: LocalStore,
}

impl ApiClient {
    /// Build a client from configuration; the token is persisted in `store`
    pub fn new(config: &AppConfig, store: LocalStore) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            token: RwLock::new(None),
            store,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn authorized(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let token = self.token.read().await.clone().ok_or(ApiError::NotAuthenticated)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    /// Send with the configured timeout and return the raw body of a 2xx
    async fn execute(&self, request: RequestBuilder) -> ApiResult<String> {
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = status.as_u16(), body = %body, "Request rejected");
                return Err(ApiError::http(status.as_u16()));
            }

            response.text().await.map_err(|e| ApiError::Network(e.to_string()))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ApiError::RequestTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn authenticate(&self, path: &str, body: &impl serde::Serialize) -> ApiResult<AuthResponse> {
        let response: AuthResponse = self
            .execute_json(self.request(Method::POST, path).json(body))
            .await?;
        self.set_token(Some(response.token.clone())).await;
        Ok(response)
    }

    /// Replace the held token and mirror it to durable storage
    ///
    /// A storage failure is logged; the in-memory token still applies.
    async fn set_token(&self, token: Option<String>) {
        let persisted = match &token {
            Some(token) => self.store.set_global(TOKEN_KEY, token).await,
            None => self.store.delete_global(TOKEN_KEY).await,
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "Failed to persist bearer token");
        }
        *self.token.write().await = token;
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn sign_up(&self, request: &SignupRequest) -> ApiResult<AuthResponse> {
        self.authenticate("/auth/register", request).await
    }

    async fn sign_in(&self, request: &LoginRequest) -> ApiResult<AuthResponse> {
        self.authenticate("/auth/login", request).await
    }

    async fn sign_in_with_provider(&self, provider: &str, request: &ProviderLoginRequest) -> ApiResult<AuthResponse> {
        self.authenticate(&format!("/auth/{}", provider), request).await
    }

    async fn sign_out(&self) -> ApiResult<()> {
        let result = match self.authorized(Method::POST, "/auth/logout").await {
            Ok(request) => self.execute(request).await.map(|_| ()),
            Err(ApiError::NotAuthenticated) => Ok(()),
            Err(e) => Err(e),
        };
        self.set_token(None).await;
        result
    }

    async fn get_current_user(&self) -> ApiResult<UserInfo> {
        let request = self.authorized(Method::GET, "/auth/me").await?;
        let response: MeResponse = self.execute_json(request).await?;
        Ok(response.into())
    }

    async fn refresh_token(&self) -> ApiResult<String> {
        let request = self.authorized(Method::POST, "/auth/refresh").await?;
        let response: RefreshResponse = self.execute_json(request).await?;
        self.set_token(Some(response.token.clone())).await;
        Ok(response.token)
    }

    async fn upload_sync(&self, request: &SyncUploadRequest) -> ApiResult<SyncUploadResponse> {
        let builder = self.authorized(Method::POST, "/sync/upload").await?.json(request);
        let body = self.execute(builder).await?;
        if body.trim().is_empty() {
            return Ok(SyncUploadResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn download_sync(&self, since: Option<DateTime<Utc>>) -> ApiResult<SyncDownloadResponse> {
        let mut builder = self.authorized(Method::GET, "/sync/download").await?;
        if let Some(since) = since {
            builder = builder.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }
        self.execute_json(builder).await
    }

    async fn ping(&self) -> bool {
        match self.execute(self.request(Method::GET, "/health")).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    async fn restore_token(&self) -> bool {
        match self.store.get_global::<String>(TOKEN_KEY).await {
            Ok(Some(token)) => {
                *self.token.write().await = Some(token);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted bearer token");
                false
            }
        }
    }

    async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }
}

//! Local Credential Records
//!
//! Lets a user sign in while the backend is unreachable. A record is kept
//! for every successful remote sign-in or sign-up (same uid as the remote
//! account, so offline sessions see the same data) and for local-only
//! accounts created while offline.
//!
//! Passwords are stored as bcrypt hashes. Hashing runs on the blocking pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::error::{AuthError, AuthResult};
use crate::client::local_db::{LocalStore, LOCAL_ACCOUNTS_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAccount {
    /// Normalized (trimmed, lowercase)
    pub email: String,
    pub password_hash: String,
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Mirrors a backend account rather than a device-only one
    #[serde(default)]
    pub remote: bool,
}

/// Prefix of uids minted for device-only accounts
pub const LOCAL_UID_PREFIX: &str = "local-";

/// Whether `uid` belongs to an account the backend has never seen
pub fn is_local_only_uid(uid: &str) -> bool {
    uid.starts_with(LOCAL_UID_PREFIX)
}

/// Emails compare case-insensitively after trimming
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug)]
pub struct LocalAccounts {
    store: LocalStore,
    cost: u32,
    write_lock: Mutex<()>,
}

impl LocalAccounts {
    pub fn new(store: LocalStore, cost: u32) -> Self {
        Self {
            store,
            cost,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn all(&self) -> AuthResult<Vec<LocalAccount>> {
        let accounts: Option<Vec<LocalAccount>> = self.store.get_global(LOCAL_ACCOUNTS_KEY).await?;
        Ok(accounts.unwrap_or_default())
    }

    pub async fn find(&self, email: &str) -> AuthResult<Option<LocalAccount>> {
        let email = normalize_email(email);
        Ok(self.all().await?.into_iter().find(|account| account.email == email))
    }

    /// Record (or refresh) the credentials of a backend account
    pub async fn remember(
        &self,
        email: &str,
        password: &str,
        uid: &str,
        display_name: Option<String>,
    ) -> AuthResult<LocalAccount> {
        let account = LocalAccount {
            email: normalize_email(email),
            password_hash: self.hash(password).await?,
            uid: uid.to_string(),
            display_name,
            created_at: Utc::now(),
            remote: true,
        };
        self.upsert(account.clone()).await?;
        Ok(account)
    }

    /// Create a device-only account; fails if the email is already known here
    pub async fn create_local(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> AuthResult<LocalAccount> {
        if self.find(email).await?.is_some() {
            return Err(AuthError::Rejected(
                "An account with this email already exists on this device".to_string(),
            ));
        }

        let account = LocalAccount {
            email: normalize_email(email),
            password_hash: self.hash(password).await?,
            uid: format!("{}{}", LOCAL_UID_PREFIX, Uuid::new_v4()),
            display_name,
            created_at: Utc::now(),
            remote: false,
        };
        self.upsert(account.clone()).await?;
        tracing::info!(uid = %account.uid, "Created local-only account");
        Ok(account)
    }

    /// The matching account if `password` verifies against its record
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<Option<LocalAccount>> {
        let Some(account) = self.find(email).await? else {
            return Ok(None);
        };

        let password = password.to_string();
        let hash = account.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))??;

        Ok(valid.then_some(account))
    }

    async fn hash(&self, password: &str) -> AuthResult<String> {
        let password = password.to_string();
        let cost = self.cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))??;
        Ok(hash)
    }

    async fn upsert(&self, account: LocalAccount) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.all().await?;
        accounts.retain(|existing| existing.email != account.email);
        accounts.push(account);
        self.store.set_global(LOCAL_ACCOUNTS_KEY, &accounts).await?;
        Ok(())
    }
}

//! # Local Key-Value Store
//!
//! Durable, per-user namespaced storage for every domain entity (subjects,
//! sessions, tasks, ...), the sync queue and the last-sync timestamp.
//!
//! ## Layout
//!
//! One SQLite table, `kv_store(key, value, updated_at)`. Keys written on
//! behalf of a user are stored as `{uid}:{key}`; a handful of global keys
//! (persisted identity, bearer token, local credential records) live outside
//! any namespace.
//!
//! Every write stamps `updated_at` monotonically per key, whether the value
//! came from the UI or from a merge, so last-writer-wins comparisons are
//! well-defined regardless of the write's source.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use studysync::client::local_db::LocalStore;
//! use studysync::client::types::Identity;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::open(&LocalStore::default_path()).await?;
//! store.switch_identity(Some(&Identity::local("u1", "me@example.com", None))).await;
//!
//! store.set("tasks", &vec!["read chapter 3"]).await?;
//! let tasks: Vec<String> = store.get("tasks").await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::client::error::{StoreError, StoreResult};
use crate::client::types::Identity;
use crate::shared::EntityType;

/// Namespaced key holding the persisted sync queue
pub const QUEUE_KEY: &str = "sync-queue";

/// Namespaced key holding the last successful sync timestamp
pub const LAST_SYNC_KEY: &str = "last-sync";

/// Global key holding the persisted identity
pub const IDENTITY_KEY: &str = "auth:identity";

/// Global key holding the bearer token
pub const TOKEN_KEY: &str = "auth:token";

/// Global key holding local credential records
pub const LOCAL_ACCOUNTS_KEY: &str = "auth:local-accounts";

/// Ordered schema migrations; version 1 is the initial layout
const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("schema.sql"))];

/// A stored value together with its write stamp
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Local key-value store
///
/// Cheap to clone; clones share the pool, the active namespace and the read
/// cache. The cache belongs to the active namespace and is dropped whenever
/// the identity changes.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    namespace: Arc<RwLock<Option<String>>>,
    cache: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

impl LocalStore {
    /// Open or create the store at `path`
    ///
    /// Uses WAL mode; creates the parent directory when needed.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// In-memory store (tests, ephemeral sessions)
    ///
    /// Pinned to a single connection that never expires, otherwise the
    /// database would vanish with the connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Platform-specific default location of the store
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("studysync");
        path.push("local.db");
        path
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self {
            pool,
            namespace: Arc::new(RwLock::new(None)),
            cache: Arc::new(RwLock::new(HashMap::new())),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current_version,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current_version) {
            tracing::debug!(version, "Applying local store migration");
            sqlx::raw_sql(sql).execute(&self.pool).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(format_stamp(&Utc::now()))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    // ── Identity namespace ──────────────────────────────────────────

    /// Point the store at another user's namespace (or none)
    ///
    /// Drops the read cache so nothing read under the previous identity can
    /// be served under the new one.
    pub async fn switch_identity(&self, identity: Option<&Identity>) {
        let uid = identity.map(|identity| identity.uid.clone());
        tracing::debug!(uid = ?uid, "Switching local store namespace");
        *self.namespace.write().await = uid;
        self.cache.write().await.clear();
    }

    /// uid of the active namespace
    pub async fn namespace(&self) -> Option<String> {
        self.namespace.read().await.clone()
    }

    async fn require_namespace(&self) -> StoreResult<String> {
        self.namespace().await.ok_or(StoreError::NoIdentity)
    }

    // ── Namespaced access ───────────────────────────────────────────

    /// Read `key` in the active namespace, or `T::default()` when absent
    /// (or when no identity is active)
    pub async fn get<T: DeserializeOwned + Default>(&self, key: &str) -> StoreResult<T> {
        match self.namespace().await {
            Some(uid) => self.get_for(&uid, key).await,
            None => Ok(T::default()),
        }
    }

    /// Write `key` in the active namespace; returns the write stamp
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<DateTime<Utc>> {
        let uid = self.require_namespace().await?;
        self.set_for(&uid, key, value).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let uid = self.require_namespace().await?;
        self.delete_for(&uid, key).await
    }

    pub async fn get_entry(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        match self.namespace().await {
            Some(uid) => self.get_entry_for(&uid, key).await,
            None => Ok(None),
        }
    }

    // ── Explicit-namespace access (sync core) ───────────────────────

    pub async fn get_for<T: DeserializeOwned + Default>(&self, uid: &str, key: &str) -> StoreResult<T> {
        match self.read_entry(&scoped(uid, key)).await? {
            Some(entry) => Ok(serde_json::from_value(entry.value)?),
            None => Ok(T::default()),
        }
    }

    pub async fn get_entry_for(&self, uid: &str, key: &str) -> StoreResult<Option<StoredEntry>> {
        self.read_entry(&scoped(uid, key)).await
    }

    pub async fn set_for<T: Serialize + ?Sized>(
        &self,
        uid: &str,
        key: &str,
        value: &T,
    ) -> StoreResult<DateTime<Utc>> {
        let value = serde_json::to_value(value)?;
        self.write_entry(&scoped(uid, key), value).await
    }

    pub async fn delete_for(&self, uid: &str, key: &str) -> StoreResult<()> {
        self.remove_entry(&scoped(uid, key)).await
    }

    /// Apply a remotely sourced value only if `remote_updated_at` is strictly
    /// newer than the stored stamp
    ///
    /// The comparison runs inside a single upsert, so a UI write that lands
    /// between the caller's read and this call is never overwritten by older
    /// server data. Returns whether the value was written.
    pub(crate) async fn merge_remote_for(
        &self,
        uid: &str,
        key: &str,
        value: &Value,
        remote_updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let full_key = scoped(uid, key);
        let result = sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
             WHERE excluded.updated_at > kv_store.updated_at",
        )
        .bind(&full_key)
        .bind(serde_json::to_string(value)?)
        .bind(format_stamp(&remote_updated_at.trunc_subsecs(6)))
        .execute(&self.pool)
        .await?;

        self.cache.write().await.remove(&full_key);
        Ok(result.rows_affected() > 0)
    }

    /// Current value of each entity type; missing types upload as `[]`
    pub async fn snapshot_for(
        &self,
        uid: &str,
        entity_types: &[EntityType],
    ) -> StoreResult<BTreeMap<EntityType, Value>> {
        let mut snapshot = BTreeMap::new();
        for entity_type in entity_types {
            let value = self
                .get_entry_for(uid, entity_type.storage_key())
                .await?
                .map(|entry| entry.value)
                .unwrap_or_else(|| Value::Array(Vec::new()));
            snapshot.insert(*entity_type, value);
        }
        Ok(snapshot)
    }

    // ── Global keys ─────────────────────────────────────────────────

    pub async fn get_global<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.read_entry(&global(key)).await? {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value)?)),
            None => Ok(None),
        }
    }

    pub async fn set_global<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.write_entry(&global(key), value).await?;
        Ok(())
    }

    pub async fn delete_global(&self, key: &str) -> StoreResult<()> {
        self.remove_entry(&global(key)).await
    }

    // ── Raw access ──────────────────────────────────────────────────

    async fn read_entry(&self, full_key: &str) -> StoreResult<Option<StoredEntry>> {
        if let Some(entry) = self.cache.read().await.get(full_key) {
            return Ok(Some(entry.clone()));
        }

        let row = sqlx::query("SELECT value, updated_at FROM kv_store WHERE key = ?")
            .bind(full_key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_value: String = row.try_get("value")?;
        let raw_stamp: String = row.try_get("updated_at")?;
        let entry = StoredEntry {
            value: serde_json::from_str(&raw_value)?,
            updated_at: parse_stamp(full_key, &raw_stamp)?,
        };

        self.cache.write().await.insert(full_key.to_string(), entry.clone());
        Ok(Some(entry))
    }

    async fn write_entry(&self, full_key: &str, value: Value) -> StoreResult<DateTime<Utc>> {
        let previous = self.read_entry(full_key).await?.map(|entry| entry.updated_at);
        let updated_at = next_stamp(previous);

        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(full_key)
        .bind(serde_json::to_string(&value)?)
        .bind(format_stamp(&updated_at))
        .execute(&self.pool)
        .await?;

        self.cache
            .write()
            .await
            .insert(full_key.to_string(), StoredEntry { value, updated_at });
        Ok(updated_at)
    }

    async fn remove_entry(&self, full_key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(full_key)
            .execute(&self.pool)
            .await?;
        self.cache.write().await.remove(full_key);
        Ok(())
    }
}

fn scoped(uid: &str, key: &str) -> String {
    format!("{}:{}", uid, key)
}

fn global(key: &str) -> String {
    format!("_global:{}", key)
}

/// Next write stamp for a key: now, but strictly after the previous stamp
pub fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous {
        Some(previous) if previous >= now => previous + chrono::Duration::milliseconds(1),
        _ => now,
    }
}

/// Fixed-width RFC 3339 so stamps compare correctly as text inside SQLite
fn format_stamp(stamp: &DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_stamp(key: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptTimestamp {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

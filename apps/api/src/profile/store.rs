use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::profile::Profile;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// One profile document per user. Each call is atomic on its own.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;
    async fn set(&self, user_id: &str, profile: &Profile) -> Result<(), StoreError>;
}

/// Postgres backend: the whole profile lives in a JSONB column.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and makes sure the `profiles` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        info!("PostgreSQL connection pool established");

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id    TEXT PRIMARY KEY,
                document   JSONB NOT NULL,
                version    BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("profiles table ready");
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let row: Option<Json<Profile>> =
            sqlx::query_scalar("SELECT document FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(profile)| profile))
    }

    async fn set(&self, user_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let version = i64::try_from(profile.metadata.version)
            .map_err(|_| StoreError::Unavailable("version out of range".to_string()))?;

        // Whole-document replace; merging happens before we get here.
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, document, version, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET document = EXCLUDED.document,
                    version = EXCLUDED.version,
                    updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(Json(profile))
        .bind(version)
        .bind(profile.metadata.last_updated)
        .execute(&self.pool)
        .await?;

        debug!("Stored profile {user_id} version {version}");
        Ok(())
    }
}

/// In-process backend for tests and `STORE_BACKEND=memory`.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    docs: Arc<Mutex<HashMap<String, Profile>>>,
    fail_next: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, user_id: &str) -> Option<Profile> {
        self.docs.lock().get(user_id).cloned()
    }

    pub fn insert(&self, profile: Profile) {
        self.docs.lock().insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.snapshot(user_id))
    }

    async fn set(&self, user_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("network unreachable".to_string()));
        }
        self.docs.lock().insert(user_id.to_string(), profile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

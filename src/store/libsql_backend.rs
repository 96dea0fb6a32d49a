//! libSQL backend: local-device implementation of the persistence contracts.
//!
//! Everything lives in one `kv_store` table keyed by `(namespace, key)`.
//! The current-layout record is a single row, so a save is one atomic
//! upsert. Legacy flat keys are plain rows in the same namespace.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::schema;
use crate::store::traits::{LegacyStore, PersistenceAdapter, StoreKind, StoredState};

/// Row key holding the current-layout assessment record.
pub const STATE_KEY: &str = "assessment_state";

/// libSQL-backed local store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    namespace: String,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run schema migrations.
    pub async fn new_local(path: &Path, namespace: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db, namespace).await?;
        info!(path = %path.display(), namespace, "Local store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(namespace: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, namespace).await
    }

    async fn from_database(db: LibSqlDatabase, namespace: &str) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        schema::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_text(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![self.namespace.as_str(), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get {key}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| StoreError::Query(format!("get {key}: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get {key}: {e}"))),
        }
    }

    async fn put_text(&self, key: &str, value: String) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_store (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (namespace, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.namespace.as_str(), key, value, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put {key}: {e}")))?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
                params![self.namespace.as_str(), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete {key}: {e}")))?;
        Ok(count > 0)
    }
}

#[async_trait]
impl PersistenceAdapter for LibSqlStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    async fn load_all(&self) -> Result<Option<StoredState>, StoreError> {
        let Some(text) = self.get_text(STATE_KEY).await? else {
            return Ok(None);
        };
        let state = serde_json::from_str(&text)
            .map_err(|e| StoreError::Serialization(format!("{STATE_KEY}: {e}")))?;
        Ok(Some(state))
    }

    async fn save_all(&self, state: &StoredState) -> Result<(), StoreError> {
        let text =
            serde_json::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_text(STATE_KEY, text).await?;
        debug!(namespace = %self.namespace, step = %state.assessment.current_step, "Assessment saved");
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        self.delete_key(STATE_KEY).await?;
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for LibSqlStore {
    async fn read_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.get_text(key).await?.map(|text| {
            // Old clients wrote some keys as bare strings rather than JSON.
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        }))
    }

    async fn write_raw(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let text =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_text(key, text).await
    }

    async fn delete_raw(&self, key: &str) -> Result<bool, StoreError> {
        self.delete_key(key).await
    }
}

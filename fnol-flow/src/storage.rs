//! Keyed persistence of in-flight sessions.
//!
//! The store is the exclusive owner of a session for its lifetime; the
//! machine operates load-mutate-save. `save` is compare-and-swap on the
//! session's version token so lost updates from non-exclusive access paths
//! surface as conflicts instead of silently interleaving.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{FnolError, Result};
use crate::session::Session;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the session. The session's `version` must match the stored
    /// version (or be 0 for a new session); the stored copy gets
    /// `version + 1`. A mismatch fails with `StoreConflict`.
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, thread_id: &str) -> Result<Option<Session>>;
    async fn delete(&self, thread_id: &str) -> Result<()>;
}

/// In-memory implementation for tests and local development.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, mut session: Session) -> Result<()> {
        match self.sessions.entry(session.thread_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().version != session.version {
                    return Err(FnolError::StoreConflict(session.thread_id));
                }
                session.version += 1;
                entry.insert(session);
            }
            Entry::Vacant(entry) => {
                if session.version != 0 {
                    return Err(FnolError::StoreConflict(session.thread_id));
                }
                session.version += 1;
                entry.insert(session);
            }
        }
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(thread_id).map(|entry| entry.clone()))
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        self.sessions.remove(thread_id);
        Ok(())
    }
}

/// PostgreSQL-backed store. Sessions are kept as JSONB rows with the version
/// token as a separate column so the CAS check runs inside the update.
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| FnolError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fnol_sessions (
                thread_id TEXT PRIMARY KEY,
                version BIGINT NOT NULL,
                session JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| FnolError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn save(&self, mut session: Session) -> Result<()> {
        let expected = session.version as i64;
        session.version += 1;
        let thread_id = session.thread_id.clone();
        let body = serde_json::to_value(&session)
            .map_err(|e| FnolError::Storage(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO fnol_sessions (thread_id, version, session, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (thread_id) DO UPDATE
                SET version = $2, session = $3, updated_at = now()
                WHERE fnol_sessions.version = $4
            "#,
        )
        .bind(&thread_id)
        .bind(expected + 1)
        .bind(&body)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| FnolError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(FnolError::StoreConflict(thread_id));
        }
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Session>> {
        let row: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT session FROM fnol_sessions WHERE thread_id = $1")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| FnolError::Storage(e.to_string()))?;

        match row {
            Some(value) => {
                let session = serde_json::from_value(value)
                    .map_err(|e| FnolError::Storage(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM fnol_sessions WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| FnolError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProductLine;

    #[tokio::test]
    async fn save_bumps_version_and_roundtrips() {
        let store = InMemorySessionStore::new();
        let session = Session::new("t-1".into(), ProductLine::Auto, None, None);

        store.save(session).await.unwrap();
        let loaded = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);

        store.save(loaded).await.unwrap();
        let loaded = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemorySessionStore::new();
        let session = Session::new("t-2".into(), ProductLine::Auto, None, None);
        store.save(session).await.unwrap();

        let first = store.get("t-2").await.unwrap().unwrap();
        let second = first.clone();

        store.save(first).await.unwrap();
        let err = store.save(second).await.unwrap_err();
        assert!(matches!(err, FnolError::StoreConflict(_)));
    }

    #[tokio::test]
    async fn new_session_with_nonzero_version_rejected() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("t-3".into(), ProductLine::Auto, None, None);
        session.version = 3;
        let err = store.save(session).await.unwrap_err();
        assert!(matches!(err, FnolError::StoreConflict(_)));
    }
}

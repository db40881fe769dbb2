use std::sync::Arc;

use async_trait::async_trait;
use conservator::{Executor, PooledConnection};
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use super::types::Event;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Storage failure, distinct from "no matching events"
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] conservator::Error),

    #[error("event {0} already stored")]
    Duplicate(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Query parameters for [`EventStore::get_events`]
///
/// Filters are conjunctive. `limit` defaults to [`DEFAULT_LIMIT`] and is
/// clamped to [`MAX_LIMIT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_type: None,
            user_id: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl EventFilter {
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn effective_limit(&self) -> usize {
        self.limit.min(MAX_LIMIT)
    }

    fn matches(&self, event: &Event) -> bool {
        let type_ok = self
            .event_type
            .as_ref()
            .is_none_or(|t| *t == event.event_type);
        let user_ok = self
            .user_id
            .as_ref()
            .is_none_or(|u| event.user_id.as_ref() == Some(u));
        type_ok && user_ok
    }
}

/// Event Store trait for persistence
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event. Either the whole event is stored or nothing is.
    async fn save_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Snapshot of matching events, newest first
    async fn get_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL implementation of Event Store
///
/// A connection is taken from the shared pool per call and released before
/// returning.
pub struct PgEventStore {
    pool: Arc<PooledConnection>,
}

impl PgEventStore {
    pub fn new(pool: Arc<PooledConnection>) -> Self {
        Self { pool }
    }

    /// Create the events table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq BIGSERIAL UNIQUE,
                id UUID PRIMARY KEY,
                type TEXT NOT NULL,
                data JSONB NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                user_id TEXT,
                correlation_id TEXT
            )
            "#,
            &[],
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS events_type_timestamp_idx ON events (type, timestamp DESC)",
            &[],
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS events_user_timestamp_idx ON events (user_id, timestamp DESC)",
            &[],
        )
        .await?;

        debug!("events schema ready");
        Ok(())
    }
}

/// BEGIN / INSERT / COMMIT on one pooled connection, ROLLBACK on any failure
async fn insert_in_transaction(pool: &PooledConnection, event: &Event) -> Result<(), StoreError> {
    let conn = pool.get().await?;

    conn.execute("BEGIN", &[]).await?;

    let inserted = conn
        .execute(
            r#"
            INSERT INTO events (id, type, data, timestamp, user_id, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
            &[
                &event.id,
                &event.event_type,
                &event.data,
                &event.timestamp,
                &event.user_id,
                &event.correlation_id,
            ],
        )
        .await;

    let outcome = match inserted {
        Ok(0) => Err(StoreError::Duplicate(event.id)),
        Ok(_) => Ok(()),
        Err(e) => Err(StoreError::Database(e)),
    };

    match outcome {
        Ok(()) => {
            conn.execute("COMMIT", &[]).await?;
            Ok(())
        }
        Err(e) => {
            if let Err(rollback) = conn.execute("ROLLBACK", &[]).await {
                error!(event_id = %event.id, error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    /// The transaction runs on its own task so a dropped caller can never
    /// hand a connection back to the pool mid-transaction.
    async fn save_event(&self, event: &Event) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let event = event.clone();

        tokio::spawn(async move { insert_in_transaction(&pool, &event).await })
            .await
            .map_err(|e| StoreError::Unavailable(format!("save task failed: {}", e)))?
    }

    async fn get_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let conn = self.pool.get().await?;
        let limit_i64 = filter.effective_limit() as i64;

        let rows = conn
            .query(
                r#"
                SELECT id, type, data, timestamp, user_id, correlation_id
                FROM events
                WHERE ($1::TEXT IS NULL OR type = $1)
                  AND ($2::TEXT IS NULL OR user_id = $2)
                ORDER BY timestamp DESC, seq DESC
                LIMIT $3
                "#,
                &[&filter.event_type, &filter.user_id, &limit_i64],
            )
            .await?;

        let events = rows
            .iter()
            .map(|row| Event {
                id: row.get("id"),
                event_type: row.get("type"),
                data: row.get("data"),
                timestamp: row.get("timestamp"),
                user_id: row.get("user_id"),
                correlation_id: row.get("correlation_id"),
            })
            .collect();

        Ok(events)
    }
}

// ============================================================================
// In-memory
// ============================================================================

struct StoredRow {
    seq: u64,
    event: Event,
}

/// In-memory Event Store, for tests and single-node development
#[derive(Default)]
pub struct MemoryEventStore {
    rows: RwLock<Vec<StoredRow>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;

        if rows.iter().any(|row| row.event.id == event.id) {
            return Err(StoreError::Duplicate(event.id));
        }

        let seq = rows.last().map(|row| row.seq + 1).unwrap_or(1);
        rows.push(StoredRow {
            seq,
            event: event.clone(),
        });
        Ok(())
    }

    async fn get_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let rows = self.rows.read().await;

        let mut matching: Vec<&StoredRow> =
            rows.iter().filter(|row| filter.matches(&row.event)).collect();
        matching.sort_by(|a, b| {
            b.event
                .timestamp
                .cmp(&a.event.timestamp)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .take(filter.effective_limit())
            .map(|row| row.event.clone())
            .collect())
    }
}

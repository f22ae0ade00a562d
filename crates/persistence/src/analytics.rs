//! Search analytics sink
//!
//! Fire-and-forget: the orchestrator spawns the insert and never waits on
//! it; failures are logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{PersistenceError, PgClient};

/// One recorded search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEvent {
    pub event_id: Uuid,
    pub query: String,
    pub mode: String,
    pub refined: bool,
    pub result_count: usize,
    pub ayah_count: usize,
    pub hadith_count: usize,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl SearchEvent {
    pub fn new(query: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            query: query.into(),
            mode: mode.into(),
            refined: false,
            result_count: 0,
            ayah_count: 0,
            hadith_count: 0,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }
}

/// Analytics event sink
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_search(&self, event: SearchEvent) -> Result<(), PersistenceError>;
}

/// Postgres-backed sink
pub struct PgAnalyticsSink {
    client: PgClient,
}

impl PgAnalyticsSink {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnalyticsSink for PgAnalyticsSink {
    async fn record_search(&self, event: SearchEvent) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO search_events
              (id, query, mode, refined, result_count, ayah_count, hadith_count,
               duration_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_id)
        .bind(&event.query)
        .bind(&event.mode)
        .bind(event.refined)
        .bind(event.result_count as i64)
        .bind(event.ayah_count as i64)
        .bind(event.hadith_count as i64)
        .bind(event.duration_ms as i64)
        .bind(event.created_at)
        .execute(self.client.pool())
        .await?;

        Ok(())
    }
}

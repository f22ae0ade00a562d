//! Postgres pool wrapper

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::PersistenceError;

/// Shared connection pool handed to every repository
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
}

impl PgClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect to Postgres using the configured URL and pool bound
pub async fn connect(
    config: &maktaba_config::DatabaseConfig,
) -> Result<PgClient, PersistenceError> {
    tracing::info!(max_connections = config.max_connections, "Connecting to Postgres");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;

    Ok(PgClient::new(pool))
}

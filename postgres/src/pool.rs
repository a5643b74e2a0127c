//! Connection pool and session factory.

use crate::error::map_sqlx_error;
use crate::session::PgSession;
use crate::statements;
use gatehouse_core::{Database, DbError, Procedure};
use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Pool settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connection string.
    pub url: String,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long `begin` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Settings for `url` with default sizing (1 to 10 connections, 30s
    /// acquire timeout).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// `PostgreSQL` implementation of [`Database`].
///
/// Cloning is cheap; all clones share one pool.
#[derive(Clone, Debug)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open a pool. Each new connection prepares every procedure statement
    /// before it is handed out, so a database missing a procedure fails here.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Backend`] if the first connection cannot be opened
    /// or a statement fails to prepare.
    pub async fn connect(config: &PoolConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    for procedure in Procedure::ALL {
                        (&mut *conn).prepare(statements::sql(procedure)).await?;
                    }
                    tracing::debug!("Prepared procedure statements on new connection");
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool ready"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Statements are then prepared lazily on first use.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open connections.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Open connections not checked out by any session.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Close every connection; pending `begin` calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Database for PgDatabase {
    type Session = PgSession;

    async fn begin(&self) -> Result<PgSession, DbError> {
        let tx = self.pool.begin().await.map_err(|e| {
            let error = map_sqlx_error(e);
            tracing::warn!(error = %error, "Failed to open database session");
            error
        })?;
        Ok(PgSession::new(tx))
    }
}

//! Persistence configuration and wiring.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::order_service::{InMemoryOrderService, OrderService, PostgresOrderService};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const SCHEMA: &str = include_str!("../migrations/0001_orders.sql");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub use_persistent_stores: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            use_persistent_stores: false,
        }
    }
}

impl PersistenceConfig {
    /// Read `DATABASE_URL`, `SHIPPLAN_DB_MAX_CONNECTIONS` and `USE_PERSISTENT_STORES`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PersistenceConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_persistent_stores = lookup("USE_PERSISTENT_STORES")
            .map(|v| v.trim().parse::<bool>().unwrap_or(false))
            .unwrap_or(false);

        let max_connections = match lookup("SHIPPLAN_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| {
                    format!("SHIPPLAN_DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'")
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }

        Ok(Self {
            database_url,
            max_connections,
            use_persistent_stores,
        })
    }

    /// Open a Postgres pool.
    pub async fn connect_pool(&self) -> anyhow::Result<PgPool> {
        let url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL is not configured")?;
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await
            .context("failed to connect to Postgres")
    }
}

/// Create the order tables if they do not exist yet.
pub async fn apply_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply order schema")?;
    Ok(())
}

/// Order service selected by configuration: Postgres or in-memory.
pub async fn build_order_service(
    config: &PersistenceConfig,
) -> anyhow::Result<Arc<dyn OrderService>> {
    if !config.use_persistent_stores {
        tracing::info!("using in-memory order service");
        return Ok(Arc::new(InMemoryOrderService::new()));
    }

    let pool = config.connect_pool().await?;
    apply_schema(&pool).await?;
    tracing::info!(max_connections = config.max_connections, "using postgres order service");
    Ok(Arc::new(PostgresOrderService::new(pool)))
}

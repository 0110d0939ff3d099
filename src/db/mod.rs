//! Database connection pool, migrations, and health check.
//!
//! One pool is shared by every partition. Each store operation checks a
//! connection out of the pool for a single statement and returns it on
//! every exit path.

pub mod kv;
pub mod queue;
pub mod schedule;

use crate::config::PoolSettings;
use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool shared across all partitions.
///
/// Cloning is cheap and clones share the pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, &PoolSettings::default()).await
    }

    /// Connect to Postgres and create a connection pool.
    pub async fn connect_with(url: &str, settings: &PoolSettings) -> Result<Self> {
        let settings = settings.clone().validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout())
            .connect(url)
            .await?;
        tracing::debug!(
            max_connections = settings.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the queue, schedule, and key/value tables and their indexes.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Clamp a caller-supplied limit into Postgres' `LIMIT` range.
fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::sql_limit;

    #[test]
    fn limit_saturates_instead_of_wrapping() {
        assert_eq!(sql_limit(0), 0);
        assert_eq!(sql_limit(25), 25);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }
}

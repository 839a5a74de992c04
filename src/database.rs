//! Postgres connection pool and schema migrations.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .connect(url)
            .await?;

        info!("Postgres pool ready ({} connections max)", max_connections);
        Ok(Database { pool })
    }

    /// Applies pending migrations from `src/migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        let migrator = sqlx::migrate!("./src/migrations");
        info!("Checking {} migration(s)", migrator.iter().count());
        migrator.run(&self.pool).await?;
        Ok(())
    }
}

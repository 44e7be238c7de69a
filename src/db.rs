//! Database helpers.
//!
//! Provides the pool type alias and the connect-and-migrate step used at
//! startup when `APP_DATABASE_URL` is set.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::AppConfig;

/// Type alias for the application database pool.
pub type AppDb = PgPool;

/// Connect to PostgreSQL and bring the schema up to date.
pub async fn connect(config: &AppConfig, database_url: &str) -> anyhow::Result<AppDb> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await?;
    info!("Connected to application database");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Application migrations complete");

    Ok(pool)
}

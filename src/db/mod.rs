use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub mod schema;

/// Create a connection pool with WAL mode and the pragma tuning the
/// config layer's `DatabaseConfig` exposes.
pub async fn create_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let url = format!("sqlite://{}?mode=rwc", path.display());

    let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
    sqlx::query("PRAGMA cache_size = -64000").execute(&pool).await?;
    sqlx::query("PRAGMA temp_store = MEMORY").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    Ok(pool)
}

/// Run database migrations. Idempotent: every statement in `schema` uses
/// `CREATE ... IF NOT EXISTS`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    sqlx::query(schema::CREATE_TABLES).execute(pool).await?;
    sqlx::query(schema::CREATE_INDEXES).execute(pool).await?;

    info!("Database migrations completed");
    Ok(())
}

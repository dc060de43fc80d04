// ABOUTME: Data layer for MarketWise - SQLite pool setup and schema migrations
// ABOUTME: Every package that persists data receives a pool created here

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
pub use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Maximum number of pooled connections for file-backed databases
const MAX_CONNECTIONS: u32 = 8;

/// Open (creating if needed) the database at `database_url`.
///
/// Foreign keys are enforced on every connection. Migrations are not run;
/// call [`run_migrations`] once at startup.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    info!("Opening database: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StorageError::InvalidUrl(format!("{}: {}", database_url, e)))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to open database {}: {}", database_url, e);
            StorageError::Sqlx(e)
        })?;

    Ok(pool)
}

/// Open a private in-memory database with the schema applied.
///
/// The pool is pinned to a single connection because every SQLite
/// in-memory connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply all pending schema migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        StorageError::Migration(e)
    })?;

    info!("Database migrations applied");
    Ok(())
}

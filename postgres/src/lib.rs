//! `PostgreSQL` booking stores for Medtour.
//!
//! This crate provides production implementations of the storage traits from
//! `medtour-core`:
//!
//! - [`PostgresBookingStore`]: bookings (`BookingStore`) and their status
//!   history (`AuditSink`) with version-guarded writes
//! - [`PostgresCatalogStore`]: add-on definitions (`CatalogStore`)
//!
//! # Optimistic Concurrency
//!
//! Every save is a single conditional statement:
//!
//! ```sql
//! UPDATE bookings SET ..., version = version + 1
//! WHERE id = $1 AND version = $2
//! ```
//!
//! If no row matches, the store reads the current version and reports
//! `StoreError::VersionConflict` (or `NotFound`). Two writers that read the
//! same version can never both commit.
//!
//! # Example
//!
//! ```ignore
//! use medtour_postgres::{PoolConfig, PostgresBookingStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = medtour_postgres::connect(&PoolConfig::new("postgres://localhost/medtour")).await?;
//!     let store = PostgresBookingStore::from_pool(pool);
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bookings;
mod catalog;

pub use bookings::PostgresBookingStore;
pub use catalog::PostgresCatalogStore;

use medtour_core::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl PoolConfig {
    /// Settings with default pool sizes (10 max, 2 min, 30 s timeout)
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database is unreachable.
pub async fn connect(config: &PoolConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))
}

pub(crate) async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Booking schema migrations applied");
    Ok(())
}

pub(crate) fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

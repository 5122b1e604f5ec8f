//! Database migration management.

use sqlx::PgPool;

use crate::error::StoreResult;

/// Run all pending database migrations.
///
/// Migrations are embedded at compile time from the `migrations/`
/// directory and applied in filename order.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    tracing::info!("Running store migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::error::StoreError::Database(sqlx::Error::Migrate(Box::new(e))))?;

    tracing::info!("Store migrations completed");
    Ok(())
}

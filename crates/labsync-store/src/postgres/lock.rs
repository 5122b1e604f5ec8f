//! Shared single-flight lock over PostgreSQL advisory locks.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{instrument, warn};

use labsync_core::TenantId;

use crate::error::StoreResult;
use crate::traits::{RunLease, RunLock};

/// Cluster-wide single-flight lock keyed by `(tenant, module)`.
///
/// Uses session-scoped advisory locks on a dedicated pool connection, so
/// two engine instances scheduling the same module can never run it
/// concurrently — the hardening a process-local lock cannot provide.
#[derive(Debug, Clone)]
pub struct PgRunLock {
    pool: PgPool,
}

impl PgRunLock {
    /// Create a lock over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLock for PgRunLock {
    #[instrument(skip(self))]
    async fn try_acquire(
        &self,
        tenant_id: TenantId,
        module: &str,
    ) -> StoreResult<Option<Box<dyn RunLease>>> {
        let key = advisory_key(tenant_id, module);
        let mut conn = self.pool.acquire().await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(conn.as_mut())
            .await?;

        if !acquired {
            return Ok(None);
        }

        Ok(Some(Box::new(PgLease {
            conn: Some(conn),
            key,
        })))
    }
}

struct PgLease {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

#[async_trait]
impl RunLease for PgLease {
    async fn release(mut self: Box<Self>) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(conn.as_mut())
                .await
            {
                warn!(error = %e, key = self.key, "failed to release advisory lock");
            }
        }
    }
}

impl Drop for PgLease {
    fn drop(&mut self) {
        // Advisory locks are session-scoped. If the lease was not released
        // explicitly, detach the connection from the pool and close it so
        // the server frees the lock instead of it leaking on a pooled
        // session.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

/// Stable 64-bit key for `(tenant, module)` — FNV-1a, deterministic across
/// processes so every instance in a cluster derives the same lock key.
fn advisory_key(tenant_id: TenantId, module: &str) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in tenant_id.as_uuid().as_bytes().iter().chain(module.as_bytes()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_key_is_deterministic() {
        let tenant = TenantId::new();
        assert_eq!(advisory_key(tenant, "products"), advisory_key(tenant, "products"));
    }

    #[test]
    fn test_advisory_key_differs_per_module() {
        let tenant = TenantId::new();
        assert_ne!(advisory_key(tenant, "products"), advisory_key(tenant, "partners"));
    }

    #[test]
    fn test_advisory_key_differs_per_tenant() {
        assert_ne!(
            advisory_key(TenantId::new(), "products"),
            advisory_key(TenantId::new(), "products")
        );
    }
}

//! Process-local single-flight lock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use labsync_core::TenantId;

use crate::error::StoreResult;
use crate::traits::{RunLease, RunLock};

type KeySet = Arc<Mutex<HashSet<(TenantId, String)>>>;

/// In-process single-flight lock keyed by `(tenant, module)`.
///
/// Sufficient for a single-instance deployment; a clustered deployment
/// needs the shared `PgRunLock` instead, since
/// overlapping schedulers on two instances would both acquire their own
/// local lock.
#[derive(Debug, Clone, Default)]
pub struct LocalRunLock {
    held: KeySet,
}

impl LocalRunLock {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_set(set: &KeySet) -> std::sync::MutexGuard<'_, HashSet<(TenantId, String)>> {
        set.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RunLock for LocalRunLock {
    async fn try_acquire(
        &self,
        tenant_id: TenantId,
        module: &str,
    ) -> StoreResult<Option<Box<dyn RunLease>>> {
        let key = (tenant_id, module.to_string());
        let mut held = Self::lock_set(&self.held);
        if !held.insert(key.clone()) {
            return Ok(None);
        }
        drop(held);

        Ok(Some(Box::new(LocalLease {
            key: Some(key),
            held: self.held.clone(),
        })))
    }
}

struct LocalLease {
    key: Option<(TenantId, String)>,
    held: KeySet,
}

impl LocalLease {
    fn remove(&mut self) {
        if let Some(key) = self.key.take() {
            LocalRunLock::lock_set(&self.held).remove(&key);
        }
    }
}

#[async_trait]
impl RunLease for LocalLease {
    async fn release(mut self: Box<Self>) {
        self.remove();
    }
}

// Backstop: a lease dropped without an explicit release still frees the key.
impl Drop for LocalLease {
    fn drop(&mut self) {
        self.remove();
    }
}

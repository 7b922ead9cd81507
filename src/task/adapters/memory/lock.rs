//! In-process named lock table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::task::ports::{DistributedLock, LockError, LockLease, LockResult};

/// Lease-based lock table shared by every scheduler in one process.
///
/// Clones share the same table. It gives the one-holder-per-name guarantee
/// within a process only; use a store-backed table when scaling out.
pub struct InMemoryLockTable<C = DefaultClock>
where
    C: Clock + Send + Sync,
{
    leases: Arc<Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>>,
    clock: Arc<C>,
}

impl<C> Clone for InMemoryLockTable<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            leases: Arc::clone(&self.leases),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> std::fmt::Debug for InMemoryLockTable<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLockTable")
            .field("leases", &self.leases)
            .finish_non_exhaustive()
    }
}

impl InMemoryLockTable<DefaultClock> {
    /// Creates an empty table using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryLockTable<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryLockTable<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty table driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

#[async_trait]
impl<C> DistributedLock for InMemoryLockTable<C>
where
    C: Clock + Send + Sync,
{
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockResult<Option<LockLease>> {
        let ttl_delta = chrono::Duration::from_std(ttl).map_err(|_| LockError::InvalidTtl(ttl))?;
        let now = self.clock.utc();
        let mut leases = self
            .leases
            .lock()
            .map_err(|err| LockError::backend(std::io::Error::other(err.to_string())))?;

        let held = leases
            .get(name)
            .is_some_and(|(_, expires_at)| *expires_at > now);
        if held {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let expires_at = now + ttl_delta;
        leases.insert(name.to_owned(), (token, expires_at));
        Ok(Some(LockLease::new(name, token, expires_at)))
    }

    async fn release(&self, lease: &LockLease) -> LockResult<()> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|err| LockError::backend(std::io::Error::other(err.to_string())))?;
        if leases
            .get(lease.name())
            .is_some_and(|(token, _)| *token == lease.token())
        {
            leases.remove(lease.name());
        }
        Ok(())
    }
}

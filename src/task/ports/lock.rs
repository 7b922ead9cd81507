//! Named distributed lock port.
//!
//! Locks are leases: a holder that stops responding loses the lock once its
//! lease expires, so a hung generation cycle cannot block other instances
//! forever.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Proof of lock ownership returned by a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    name: String,
    token: Uuid,
    expires_at: DateTime<Utc>,
}

impl LockLease {
    /// Creates a lease record.
    #[must_use]
    pub fn new(name: impl Into<String>, token: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            token,
            expires_at,
        }
    }

    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the holder token.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }

    /// Returns the lease expiry.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Mutual exclusion keyed by a logical name, effective across processes.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Attempts to take the lock without waiting.
    ///
    /// Returns `None` when another holder owns an unexpired lease.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockResult<Option<LockLease>>;

    /// Releases a lease. Releasing an expired or foreign lease is a no-op.
    async fn release(&self, lease: &LockLease) -> LockResult<()>;
}

/// Errors returned by lock implementations.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// The lock could not be taken before the deadline.
    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    Timeout {
        /// Lock name.
        name: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The lease duration cannot be represented.
    #[error("invalid lease duration {0:?}")]
    InvalidTtl(Duration),

    /// Backend failure.
    #[error("lock backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    /// Wraps a backend error.
    #[must_use]
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}

/// Polls `lock` until the lease is granted or `wait` elapses.
///
/// # Errors
///
/// Returns [`LockError::Timeout`] when the deadline passes, or the backend
/// error of the underlying lock.
pub async fn acquire_within<L>(
    lock: &L,
    name: &str,
    ttl: Duration,
    wait: Duration,
    poll_every: Duration,
) -> LockResult<LockLease>
where
    L: DistributedLock + ?Sized,
{
    let started = tokio::time::Instant::now();
    loop {
        if let Some(lease) = lock.try_acquire(name, ttl).await? {
            return Ok(lease);
        }
        let waited = started.elapsed();
        if waited >= wait {
            return Err(LockError::Timeout {
                name: name.to_owned(),
                waited,
            });
        }
        tokio::time::sleep(poll_every.min(wait.saturating_sub(waited))).await;
    }
}

//! Storage backends for channel records.
//!
//! A backend only needs two primitives to support concurrent webhook
//! deliveries: a versioned read and a conditional write that succeeds only
//! when the stored revision is still the one that was read. The retry loop
//! built on top of them lives in [`TodoRepository`].
//!
//! ## Structure
//!
//! - [`memory`] - process-local backend (default, used by tests).
//! - `redis` - shared backend, behind the `redis` feature.
//!
//! [`TodoRepository`]: crate::TodoRepository

use crate::{ChannelKey, ChannelRecord, Result};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;

/// Version stamp of a stored channel record.
///
/// Every successful write and every removal moves the revision forward by
/// one, so the revisions of a key never repeat. A key that was never written
/// is at [`Revision::ABSENT`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    pub const ABSENT: Self = Self(0);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A record together with the revision it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub value: T,
}

/// Conditional-write storage for channel records.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reads the record stored under `key`, if any, with its revision.
    ///
    /// A removed record reads as `None` at the revision its removal left.
    async fn load(&self, key: &ChannelKey) -> Result<Versioned<Option<ChannelRecord>>>;

    /// Stores `record` only if the current revision equals `expected`.
    ///
    /// Returns `false` without writing when another writer got there first.
    async fn compare_and_set(
        &self,
        key: &ChannelKey,
        expected: Revision,
        record: &ChannelRecord,
    ) -> Result<bool>;

    /// Snapshot of every stored channel record.
    async fn channels(&self) -> Result<Vec<ChannelRecord>>;

    /// Deletes the record under `key`, advancing its revision. Returns
    /// whether one existed.
    async fn remove(&self, key: &ChannelKey) -> Result<bool>;
}

use super::{Backend, Revision, Versioned};
use crate::{ChannelKey, ChannelRecord, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Process-local backend.
///
/// Records live in a single map behind a mutex; the lock is never held across
/// an await point. Removed records leave a tombstone holding their last
/// revision.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<ChannelKey, Versioned<Option<ChannelRecord>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load(&self, key: &ChannelKey) -> Result<Versioned<Option<ChannelRecord>>> {
        Ok(self.records.lock().get(key).cloned().unwrap_or(Versioned {
            revision: Revision::ABSENT,
            value: None,
        }))
    }

    async fn compare_and_set(
        &self,
        key: &ChannelKey,
        expected: Revision,
        record: &ChannelRecord,
    ) -> Result<bool> {
        let mut records = self.records.lock();
        let current = records
            .get(key)
            .map_or(Revision::ABSENT, |stored| stored.revision);
        if current != expected {
            return Ok(false);
        }
        records.insert(
            key.clone(),
            Versioned {
                revision: expected.next(),
                value: Some(record.clone()),
            },
        );
        Ok(true)
    }

    async fn channels(&self) -> Result<Vec<ChannelRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter_map(|stored| stored.value.clone())
            .collect())
    }

    async fn remove(&self, key: &ChannelKey) -> Result<bool> {
        let mut records = self.records.lock();
        let Some(stored) = records.get_mut(key) else {
            return Ok(false);
        };
        if stored.value.take().is_none() {
            return Ok(false);
        }
        stored.revision = stored.revision.next();
        Ok(true)
    }
}

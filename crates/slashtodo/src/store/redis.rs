//! Redis backend.
//!
//! # Key Design
//!
//! - `slashtodo:channel:{team}-{channel}` -> HASH with `rev` (revision) and
//!   `doc` (JSON channel record)
//! - `slashtodo:channels` -> SET of every channel hash key
//!
//! The conditional write and the removal are Lua scripts, so the revision
//! check and the write happen atomically on the server and work over a
//! multiplexed connection. Removing a record only drops `doc` and bumps `rev`;
//! a hash without `doc` reads as absent.

use super::{Backend, Revision, Versioned};
use crate::{ChannelKey, ChannelRecord, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use std::sync::LazyLock;

const CHANNEL_KEY_PREFIX: &str = "slashtodo:channel:";
const CHANNEL_INDEX_KEY: &str = "slashtodo:channels";

// Returns 1 when written, 0 on a revision mismatch.
static COMPARE_AND_SET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local current = redis.call('HGET', KEYS[1], 'rev') or '0'
        if current ~= ARGV[1] then
            return 0
        end
        redis.call('HSET', KEYS[1], 'rev', ARGV[2], 'doc', ARGV[3])
        redis.call('SADD', KEYS[2], KEYS[1])
        return 1
        ",
    )
});

// Returns 1 when a record was removed.
static REMOVE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('HDEL', KEYS[1], 'doc') == 0 then
            return 0
        end
        redis.call('HINCRBY', KEYS[1], 'rev', 1)
        redis.call('SREM', KEYS[2], KEYS[1])
        return 1
        ",
    )
});

fn channel_key(key: &ChannelKey) -> String {
    format!("{CHANNEL_KEY_PREFIX}{key}")
}

/// Shared backend storing one hash per channel.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
}

impl RedisBackend {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Connects to the server at `url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn load(&self, key: &ChannelKey) -> Result<Versioned<Option<ChannelRecord>>> {
        let mut conn = self.connection.clone();
        let (rev, doc): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(channel_key(key))
            .arg("rev")
            .arg("doc")
            .query_async(&mut conn)
            .await?;

        Ok(Versioned {
            revision: rev.map_or(Revision::ABSENT, Revision),
            value: doc.map(|doc| serde_json::from_str(&doc)).transpose()?,
        })
    }

    async fn compare_and_set(
        &self,
        key: &ChannelKey,
        expected: Revision,
        record: &ChannelRecord,
    ) -> Result<bool> {
        let doc = serde_json::to_string(record)?;
        let mut conn = self.connection.clone();
        let written: i64 = COMPARE_AND_SET
            .key(channel_key(key))
            .key(CHANNEL_INDEX_KEY)
            .arg(expected.0)
            .arg(expected.next().0)
            .arg(doc)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn channels(&self) -> Result<Vec<ChannelRecord>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.smembers(CHANNEL_INDEX_KEY).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hget(key, "doc");
        }
        let docs: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        // Index entries can outlive their hash if a removal raced a listing.
        docs.into_iter()
            .flatten()
            .map(|doc| serde_json::from_str(&doc).map_err(Into::into))
            .collect()
    }

    async fn remove(&self, key: &ChannelKey) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = REMOVE
            .key(channel_key(key))
            .key(CHANNEL_INDEX_KEY)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }
}

impl core::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

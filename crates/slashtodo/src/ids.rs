//! Key minting and the wall clock used for todo timestamps.
//!
//! Keys are ULIDs rendered in Crockford Base32: 48 bits of milliseconds
//! followed by 80 random bits, so they sort by creation time and never need
//! coordination between concurrent webhook deliveries. Numeric ids come from
//! the channel counter instead, see [`ChannelRecord::next_id`].
//!
//! [`ChannelRecord::next_id`]: crate::ChannelRecord::next_id

use chrono::{DateTime, Utc};
use ferroid::{base32::Base32UlidExt, id::ULID};
use std::time::{SystemTime, UNIX_EPOCH};

pub use ferroid::{rand::{RandSource, ThreadRandom}, time::TimeSource};

/// Milliseconds since the UNIX epoch, read from the system clock.
#[derive(Default, Clone, Copy, Debug)]
pub struct SystemClock;

impl TimeSource<u128> for SystemClock {
    fn current_millis(&self) -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
    }
}

type DynClock = dyn TimeSource<u128> + Send + Sync;
type DynRand = dyn RandSource<u128> + Send + Sync;

/// Produces creation timestamps and todo keys.
pub struct KeyMint {
    clock: Box<DynClock>,
    rng: Box<DynRand>,
}

impl Default for KeyMint {
    fn default() -> Self {
        Self::new(SystemClock, ThreadRandom)
    }
}

impl KeyMint {
    pub fn new<T, R>(clock: T, rng: R) -> Self
    where
        T: TimeSource<u128> + Send + Sync + 'static,
        R: RandSource<u128> + Send + Sync + 'static,
    {
        Self {
            clock: Box::new(clock),
            rng: Box::new(rng),
        }
    }

    /// Current time as a UTC timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.clock.current_millis())
    }

    /// Mints a new key, returning it with the timestamp embedded in it.
    pub fn mint(&self) -> (DateTime<Utc>, String) {
        let millis = self.clock.current_millis();
        let ulid = ULID::from(millis, self.rng.rand());
        (millis_to_datetime(millis), ulid.encode().to_string())
    }
}

impl core::fmt::Debug for KeyMint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyMint").finish_non_exhaustive()
    }
}

fn millis_to_datetime(millis: u128) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

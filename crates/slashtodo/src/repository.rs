//! Todo operations on top of a conditional-write [`Backend`].
//!
//! Every mutation goes through [`TodoRepository::transact`]: read the channel
//! record and its revision, apply the change to a local copy, then write it
//! back only if nobody else wrote in between. Losing that race simply means
//! reading again, so concurrent deliveries for the same channel serialize on
//! the record revision and each `add` gets a distinct counter value.

use crate::store::{Backend, Versioned};
use crate::{AdminScope, ChannelKey, ChannelRecord, Error, KeyMint, NewTodo, Result, Todo};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Conditional-write attempts before giving up with [`Error::Contention`].
pub const DEFAULT_MAX_ATTEMPTS: usize = 25;

/// Description stored when a todo is created without one.
pub const DEFAULT_DESCRIPTION: &str = "no description provided during task creation";

const MAX_BACKOFF_MILLIS: u64 = 64;

/// Per-channel todo lists backed by a shared store.
#[derive(Clone)]
pub struct TodoRepository {
    backend: Arc<dyn Backend>,
    mint: Arc<KeyMint>,
    max_attempts: usize,
}

impl TodoRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            mint: Arc::new(KeyMint::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Replaces the clock and random source used for timestamps and keys.
    #[must_use]
    pub fn with_mint(mut self, mint: KeyMint) -> Self {
        self.mint = Arc::new(mint);
        self
    }

    /// Sets the retry budget; values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn mint(&self) -> &KeyMint {
        &self.mint
    }

    /// Runs `apply` against the channel record under optimistic concurrency.
    ///
    /// A missing record is initialised first, so the closure always sees one.
    /// The result is written only when the record was created or changed, and
    /// only if its revision is still the one that was read; otherwise the
    /// whole read-apply-write cycle starts over. An error from `apply` aborts
    /// without writing anything.
    pub async fn transact<T, F>(&self, key: &ChannelKey, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut ChannelRecord) -> Result<T>,
    {
        for attempt in 1..=self.max_attempts {
            let Versioned {
                revision,
                value: original,
            } = self.backend.load(key).await?;

            let mut record = match &original {
                Some(record) => record.clone(),
                None => ChannelRecord::new(key, self.mint.now()),
            };
            let output = apply(&mut record)?;

            if original.as_ref() == Some(&record) {
                return Ok(output);
            }
            if self.backend.compare_and_set(key, revision, &record).await? {
                return Ok(output);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(channel = %key, attempt, ?revision, "conditional write lost, retrying");

            if attempt < self.max_attempts {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(channel = %key, attempts = self.max_attempts, "giving up on contended channel");

        Err(Error::Contention {
            attempts: self.max_attempts,
        })
    }

    /// Gets the channel record, creating it if it does not exist yet.
    pub async fn channel(&self, key: &ChannelKey) -> Result<ChannelRecord> {
        self.transact(key, |record| Ok(record.clone())).await
    }

    /// Allocates the next id and key for the channel and stores the todo.
    pub async fn add(&self, new: NewTodo) -> Result<Todo> {
        let title = new.title.trim().to_owned();
        if title.is_empty() {
            return Err(Error::EmptyTitle);
        }
        let description = new
            .description
            .as_deref()
            .map(str::trim)
            .filter(|description| !description.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_owned();

        let key = ChannelKey::new(&new.team_id, &new.channel_id);
        let todo = self
            .transact(&key, |record| {
                let id = record.next_id();
                let (created_at, todo_key) = self.mint.mint();
                let todo = Todo {
                    id,
                    key: todo_key.clone(),
                    created_by: new.user_name.clone(),
                    created_by_user_id: new.user_id.clone(),
                    created_at,
                    team_id: key.team_id.clone(),
                    channel_id: key.channel_id.clone(),
                    done: false,
                    title: title.clone(),
                    description: description.clone(),
                };
                record.todos.insert(todo_key, todo.clone());
                Ok(todo)
            })
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(channel = %key, id = todo.id, key = %todo.key, "todo added");

        Ok(todo)
    }

    /// Todos of the channel, ordered by id.
    pub async fn list(&self, key: &ChannelKey) -> Result<Vec<Todo>> {
        Ok(self.channel(key).await?.sorted_todos())
    }

    pub async fn find_by_id(&self, key: &ChannelKey, id: u64) -> Result<Todo> {
        self.channel(key)
            .await?
            .find_by_id(id)
            .cloned()
            .ok_or_else(|| Error::not_found("id", id.to_string()))
    }

    pub async fn find_by_key(&self, key: &ChannelKey, todo_key: &str) -> Result<Todo> {
        self.channel(key)
            .await?
            .todos
            .get(todo_key)
            .cloned()
            .ok_or_else(|| Error::not_found("key", todo_key))
    }

    /// Removes a todo on behalf of `user_id`, who must be its creator.
    pub async fn close(&self, key: &ChannelKey, todo_key: &str, user_id: &str) -> Result<Todo> {
        self.transact(key, |record| {
            let todo = record
                .todos
                .get(todo_key)
                .ok_or_else(|| Error::not_found("key", todo_key))?;
            if todo.created_by_user_id != user_id {
                return Err(Error::NotOwner);
            }
            record
                .todos
                .remove(todo_key)
                .ok_or_else(|| Error::not_found("key", todo_key))
        })
        .await
    }

    /// Every channel record within `scope`.
    pub async fn snapshot(&self, scope: &AdminScope) -> Result<Vec<ChannelRecord>> {
        let mut records: Vec<ChannelRecord> = self
            .backend
            .channels()
            .await?
            .into_iter()
            .filter(|record| scope.contains(&record.key()))
            .collect();
        records.sort_by_key(ChannelRecord::key);
        Ok(records)
    }

    /// Deletes every channel record within `scope`, returning how many went.
    pub async fn purge(&self, scope: &AdminScope) -> Result<usize> {
        let mut removed = 0;
        for record in self.snapshot(scope).await? {
            if self.backend.remove(&record.key()).await? {
                removed += 1;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(?scope, removed, "purged channel records");

        Ok(removed)
    }
}

impl core::fmt::Debug for TodoRepository {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TodoRepository")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Capped exponential backoff with full jitter.
fn backoff(attempt: usize) -> Duration {
    let cap = 1u64
        .checked_shl(attempt.min(16) as u32)
        .unwrap_or(MAX_BACKOFF_MILLIS)
        .min(MAX_BACKOFF_MILLIS);
    Duration::from_millis(rand::rng().random_range(0..=cap))
}

#[cfg(test)]
mod tests;

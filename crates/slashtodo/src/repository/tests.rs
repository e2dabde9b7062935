use crate::store::{Backend, MemoryBackend, Revision, Versioned};
use crate::{
    AdminScope, ChannelKey, ChannelRecord, DEFAULT_DESCRIPTION, Error, KeyMint, NewTodo,
    Result, TodoRepository,
};
use async_trait::async_trait;
use ferroid::{rand::RandSource, time::TimeSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct FixedTime;

impl TimeSource<u128> for FixedTime {
    fn current_millis(&self) -> u128 {
        1_714_557_600_000
    }
}

struct CountingRand {
    next: AtomicU64,
}

impl RandSource<u128> for CountingRand {
    fn rand(&self) -> u128 {
        self.next.fetch_add(1, Ordering::Relaxed) as u128
    }
}

/// Wraps a backend, counting writes and optionally losing every race.
#[derive(Default)]
struct InstrumentedBackend {
    inner: MemoryBackend,
    writes: AtomicUsize,
    always_conflict: bool,
}

#[async_trait]
impl Backend for InstrumentedBackend {
    async fn load(&self, key: &ChannelKey) -> Result<Versioned<Option<ChannelRecord>>> {
        self.inner.load(key).await
    }

    async fn compare_and_set(
        &self,
        key: &ChannelKey,
        expected: Revision,
        record: &ChannelRecord,
    ) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.always_conflict {
            return Ok(false);
        }
        self.inner.compare_and_set(key, expected, record).await
    }

    async fn channels(&self) -> Result<Vec<ChannelRecord>> {
        self.inner.channels().await
    }

    async fn remove(&self, key: &ChannelKey) -> Result<bool> {
        self.inner.remove(key).await
    }
}

fn repository() -> TodoRepository {
    repository_on(Arc::new(MemoryBackend::new()))
}

fn repository_on(backend: Arc<dyn Backend>) -> TodoRepository {
    TodoRepository::new(backend).with_mint(KeyMint::new(
        FixedTime,
        CountingRand {
            next: AtomicU64::new(0),
        },
    ))
}

fn new_todo(channel: &str, user: &str, title: &str) -> NewTodo {
    NewTodo {
        team_id: "T1".into(),
        channel_id: channel.into(),
        user_name: format!("{user}-name"),
        user_id: user.into(),
        title: title.into(),
        description: None,
    }
}

fn channel(channel: &str) -> ChannelKey {
    ChannelKey::new("T1", channel)
}

#[tokio::test]
async fn add_allocates_sequential_ids_and_distinct_keys() {
    let repo = repository();
    let first = repo.add(new_todo("C1", "u1", "first")).await.unwrap();
    let second = repo.add(new_todo("C1", "u1", "second")).await.unwrap();
    let other_channel = repo.add(new_todo("C2", "u1", "elsewhere")).await.unwrap();

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(other_channel.id, 1);
    assert_ne!(first.key, second.key);
    assert!(!first.done);
    assert_eq!(first.created_by, "u1-name");
    assert_eq!(first.created_by_user_id, "u1");
    assert_eq!(first.team_id, "T1");
    assert_eq!(first.channel_id, "C1");

    let record = repo.channel(&channel("C1")).await.unwrap();
    assert_eq!(record.counter, 2);
    assert_eq!(record.todos.len(), 2);
    assert_eq!(record.todos[&first.key], first);
}

#[tokio::test]
async fn add_trims_and_defaults_description() {
    let repo = repository();
    let mut input = new_todo("C1", "u1", "  padded title ");
    input.description = Some("   ".into());
    let todo = repo.add(input).await.unwrap();
    assert_eq!(todo.title, "padded title");
    assert_eq!(todo.description, DEFAULT_DESCRIPTION);

    let mut input = new_todo("C1", "u1", "x");
    input.description = Some(" two litres ".into());
    assert_eq!(repo.add(input).await.unwrap().description, "two litres");
}

#[tokio::test]
async fn add_rejects_blank_title_without_touching_the_store() {
    let backend = Arc::new(InstrumentedBackend::default());
    let repo = repository_on(backend.clone());
    let err = repo.add(new_todo("C1", "u1", "   ")).await.unwrap_err();
    assert!(matches!(err, Error::EmptyTitle));
    assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reading_an_unknown_channel_creates_it_once() {
    let backend = Arc::new(InstrumentedBackend::default());
    let repo = repository_on(backend.clone());

    assert!(repo.list(&channel("C1")).await.unwrap().is_empty());
    assert!(repo.list(&channel("C1")).await.unwrap().is_empty());

    assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    let stored = backend.load(&channel("C1")).await.unwrap().value.unwrap();
    assert_eq!(stored.counter, 0);
    assert_eq!(stored.team_id, "T1");
}

#[tokio::test]
async fn list_is_ordered_by_id() {
    let repo = repository();
    for title in ["a", "b", "c"] {
        repo.add(new_todo("C1", "u1", title)).await.unwrap();
    }
    let ids: Vec<u64> = repo
        .list(&channel("C1"))
        .await
        .unwrap()
        .iter()
        .map(|todo| todo.id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn lookups_by_id_and_key() {
    let repo = repository();
    let todo = repo.add(new_todo("C1", "u1", "find me")).await.unwrap();

    assert_eq!(repo.find_by_id(&channel("C1"), 1).await.unwrap(), todo);
    assert_eq!(repo.find_by_key(&channel("C1"), &todo.key).await.unwrap(), todo);

    let err = repo.find_by_id(&channel("C1"), 9).await.unwrap_err();
    assert_eq!(err.to_string(), "no todo with id[9] could be found");
    assert!(err.is_client_error());
    assert!(matches!(
        repo.find_by_key(&channel("C2"), &todo.key).await,
        Err(Error::NotFound { field: "key", .. })
    ));
}

#[tokio::test]
async fn only_the_creator_can_close() {
    let repo = repository();
    let todo = repo.add(new_todo("C1", "u1", "mine")).await.unwrap();

    let err = repo.close(&channel("C1"), &todo.key, "u2").await.unwrap_err();
    assert!(matches!(err, Error::NotOwner));
    assert_eq!(repo.list(&channel("C1")).await.unwrap().len(), 1);

    let closed = repo.close(&channel("C1"), &todo.key, "u1").await.unwrap();
    assert_eq!(closed, todo);
    assert!(repo.list(&channel("C1")).await.unwrap().is_empty());

    assert!(matches!(
        repo.close(&channel("C1"), &todo.key, "u1").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn ids_are_not_reused_after_close() {
    let repo = repository();
    let first = repo.add(new_todo("C1", "u1", "one")).await.unwrap();
    repo.close(&channel("C1"), &first.key, "u1").await.unwrap();
    let next = repo.add(new_todo("C1", "u1", "two")).await.unwrap();
    assert_eq!(next.id, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_get_unique_ids() {
    const TASKS: u64 = 32;
    let repo = TodoRepository::new(Arc::new(MemoryBackend::new()));

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.add(new_todo("C1", "u1", &format!("task {i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let todos = futures::future::try_join_all(handles).await.unwrap();
    let ids: HashSet<u64> = todos.iter().map(|todo| todo.id).collect();
    let keys: HashSet<&str> = todos.iter().map(|todo| todo.key.as_str()).collect();
    assert_eq!(ids, (1..=TASKS).collect());
    assert_eq!(keys.len() as u64, TASKS);

    let record = repo.channel(&channel("C1")).await.unwrap();
    assert_eq!(record.counter, TASKS);
    assert_eq!(record.todos.len() as u64, TASKS);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let backend = Arc::new(InstrumentedBackend {
        always_conflict: true,
        ..Default::default()
    });
    let repo = repository_on(backend.clone()).with_max_attempts(3);

    let err = repo.add(new_todo("C1", "u1", "never")).await.unwrap_err();
    assert!(matches!(err, Error::Contention { attempts: 3 }));
    assert!(!err.is_client_error());
    assert_eq!(backend.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn snapshot_and_purge_respect_scope() {
    let repo = repository();
    repo.add(new_todo("C1", "u1", "a")).await.unwrap();
    repo.add(new_todo("C2", "u1", "b")).await.unwrap();
    let mut other_team = new_todo("C1", "u1", "c");
    other_team.team_id = "T2".into();
    repo.add(other_team).await.unwrap();

    let team = AdminScope::Team {
        team_id: "T1".into(),
    };
    let keys: Vec<String> = repo
        .snapshot(&team)
        .await
        .unwrap()
        .iter()
        .map(|record| record.key().to_string())
        .collect();
    assert_eq!(keys, vec!["T1-C1", "T1-C2"]);

    let removed = repo
        .purge(&AdminScope::Channel(channel("C2")))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(repo.snapshot(&AdminScope::System).await.unwrap().len(), 2);

    assert_eq!(repo.purge(&AdminScope::System).await.unwrap(), 2);
    assert!(repo.snapshot(&AdminScope::System).await.unwrap().is_empty());
}

#[tokio::test]
async fn purged_channel_starts_over_without_stale_todos() {
    let backend = Arc::new(MemoryBackend::new());
    let repo = repository_on(backend.clone());
    repo.add(new_todo("C1", "u1", "old")).await.unwrap();
    let before_purge = backend.load(&channel("C1")).await.unwrap();

    assert_eq!(repo.purge(&AdminScope::System).await.unwrap(), 1);

    let fresh = repo.add(new_todo("C1", "u1", "new")).await.unwrap();
    assert_eq!(fresh.id, 1);

    // A write prepared before the purge must not resurrect the old record.
    let stale = before_purge.value.unwrap();
    assert!(
        !backend
            .compare_and_set(&channel("C1"), before_purge.revision, &stale)
            .await
            .unwrap()
    );
    let todos = repo.list(&channel("C1")).await.unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].title, "new");
}

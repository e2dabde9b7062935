use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Renders a timestamp the way chat clients receive it: ISO-8601 UTC with
/// millisecond precision, e.g. `2024-05-01T10:00:00.000Z`.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

/// Identifies a channel record: one todo list per team and channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    pub team_id: String,
    pub channel_id: String,
}

impl ChannelKey {
    pub fn new(team_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// Storage key, `{team_id}-{channel_id}`.
impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.team_id, self.channel_id)
    }
}

/// A single todo item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Per-channel numeric identifier allocated from the channel counter.
    pub id: u64,
    /// Globally unique, time-ordered key the todo is stored under.
    pub key: String,
    pub created_by: String,
    pub created_by_user_id: String,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    pub team_id: String,
    pub channel_id: String,
    pub done: bool,
    pub title: String,
    pub description: String,
}

impl Todo {
    pub fn channel(&self) -> ChannelKey {
        ChannelKey::new(&self.team_id, &self.channel_id)
    }
}

/// The stored aggregate for one channel.
///
/// `counter` only ever grows: removing a todo never frees its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    pub team_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub todos: BTreeMap<String, Todo>,
    #[serde(default)]
    pub counter: u64,
}

impl ChannelRecord {
    /// Fresh, empty record for `key`.
    pub fn new(key: &ChannelKey, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            team_id: key.team_id.clone(),
            channel_id: key.channel_id.clone(),
            todos: BTreeMap::new(),
            counter: 0,
        }
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(&self.team_id, &self.channel_id)
    }

    /// Bumps the counter and returns the new value.
    pub fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Todos ordered by id.
    pub fn sorted_todos(&self) -> Vec<Todo> {
        let mut todos: Vec<Todo> = self.todos.values().cloned().collect();
        todos.sort_by_key(|todo| todo.id);
        todos
    }

    pub fn find_by_id(&self, id: u64) -> Option<&Todo> {
        self.todos.values().find(|todo| todo.id == id)
    }
}

/// Input for creating a todo from a slash command.
#[derive(Clone, Debug, Default)]
pub struct NewTodo {
    pub team_id: String,
    pub channel_id: String,
    pub user_name: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
}

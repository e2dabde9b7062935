//! Chat-formatted responses.
//!
//! Slash commands answer with a [`SlashResponse`]: either plain text or a
//! message attachment. The detail view carries a "Close" action whose
//! integration posts an [`ActionRequest`] back to the service, which answers
//! with an [`ActionResponse`].

use crate::{Todo, format_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Path the close action posts back to, relative to the public base URL.
pub const CLOSE_ACTION_PATH: &str = "/todoClose";

const DETAIL_COLOR: &str = "#97a1ff";

const USAGE: &[&str] = &[
    "Usage:",
    "- `/todo`: prints this usage",
    "- `/todo list`: list todos of the current channel",
    "- `/todo add | TASK [| DESCRIPTION]` : add a todo item for TASK, optionally described by DESCRIPTION",
    "- `/todo ID` : prints details of task identified by the given ID",
    "- `/todo key | KEY` : prints details of task identified by the given KEY",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Only visible to the user who typed the command.
    Ephemeral,
    /// Posted to the whole channel.
    InChannel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashResponse {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl SlashResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub fallback: String,
    pub color: String,
    pub text: String,
    pub author_name: String,
    pub title: String,
    pub fields: Vec<Field>,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub short: bool,
    pub title: String,
    pub value: serde_json::Value,
}

impl Field {
    fn new(short: bool, title: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            short,
            title: title.to_owned(),
            value: value.into(),
        }
    }
}

/// Interactive button attached to a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub color: Option<String>,
    pub integration: Integration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub url: String,
    pub context: ActionContext,
}

/// Context echoed back by the chat platform when an action is clicked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionContext {
    pub id: u64,
    pub key: String,
    pub token: String,
    pub team_id: String,
    pub channel_id: String,
}

/// Body of an interactive action callback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActionRequest {
    pub user_id: String,
    pub context: Option<ActionContext>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUpdate {
    pub message: String,
}

/// Reply to an action: rewrites the original post and tells the clicker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub update: ActionUpdate,
    pub ephemeral_text: String,
}

pub fn usage() -> SlashResponse {
    SlashResponse::ephemeral(USAGE.join("\n"))
}

/// Markdown table of `todos`, or a short notice when there are none.
pub fn summarize(todos: &[Todo]) -> String {
    if todos.is_empty() {
        return "No task found.".to_owned();
    }

    let mut lines = vec![
        "---".to_owned(),
        "### Tasks of channel".to_owned(),
        String::new(),
        "| ID | Task | Created By | Created At | Key |".to_owned(),
        "|:-------:|:--------|:-------:|:-------:|:-------:|".to_owned(),
    ];
    lines.extend(todos.iter().map(|todo| {
        format!(
            "| {} | {} | {} | {} | {} |",
            todo.id,
            todo.title,
            todo.created_by,
            format_timestamp(&todo.created_at),
            todo.key
        )
    }));
    lines.push("---".to_owned());
    lines.join("\n")
}

pub fn list(todos: &[Todo]) -> SlashResponse {
    SlashResponse::ephemeral(summarize(todos))
}

pub fn list_failed(reason: impl core::fmt::Display) -> SlashResponse {
    SlashResponse::ephemeral(format!("There was an error listing the tasks: {reason}"))
}

pub fn created(todo: &Todo) -> SlashResponse {
    SlashResponse::ephemeral(format!("new task created under key: {}", todo.key))
}

pub fn creation_failed(reason: impl core::fmt::Display) -> SlashResponse {
    SlashResponse::ephemeral(format!("There was an error creating the task: {reason}"))
}

pub fn no_task_with_id(id: &str) -> SlashResponse {
    SlashResponse::ephemeral(format!("No task found with id[{id}]"))
}

pub fn no_task_with_key(key: &str) -> SlashResponse {
    SlashResponse::ephemeral(format!("No task found with key[{key}]"))
}

/// Close button for `todo`, posting back to `{base_url}/todoClose`.
pub fn close_action(todo: &Todo, token: &str, base_url: &str) -> Action {
    Action {
        name: "☠ Close".to_owned(),
        color: None,
        integration: Integration {
            url: format!("{base_url}{CLOSE_ACTION_PATH}"),
            context: ActionContext {
                id: todo.id,
                key: todo.key.clone(),
                token: token.to_owned(),
                team_id: todo.team_id.clone(),
                channel_id: todo.channel_id.clone(),
            },
        },
    }
}

/// In-channel card describing one todo.
pub fn detail(todo: &Todo, token: &str, base_url: &str) -> SlashResponse {
    let created_at = format_timestamp(&todo.created_at);
    SlashResponse {
        response_type: ResponseType::InChannel,
        text: None,
        attachments: vec![Attachment {
            fallback: format!("{} by {} on {}", todo.title, todo.created_by, created_at),
            color: DETAIL_COLOR.to_owned(),
            text: todo.description.clone(),
            author_name: todo.created_by.clone(),
            title: todo.title.clone(),
            fields: vec![
                Field::new(false, "Creation date", created_at),
                Field::new(true, "Key", todo.key.clone()),
                Field::new(true, "Id", todo.id),
            ],
            actions: vec![close_action(todo, token, base_url)],
        }],
    }
}

pub fn closed(key: &str, at: &DateTime<Utc>) -> ActionResponse {
    ActionResponse {
        update: ActionUpdate {
            message: format!("Task has been completed on {}", format_timestamp(at)),
        },
        ephemeral_text: format!("You completed the task[{key}]!"),
    }
}

pub fn close_failed(key: &str, reason: impl core::fmt::Display) -> SlashResponse {
    SlashResponse::ephemeral(format!("Cannot complete task[{key}]: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn todo(id: u64, key: &str, title: &str) -> Todo {
        Todo {
            id,
            key: key.into(),
            created_by: "alice".into(),
            created_by_user_id: "u1".into(),
            created_at: Utc.timestamp_millis_opt(1_714_557_600_000).unwrap(),
            team_id: "T1".into(),
            channel_id: "C1".into(),
            done: false,
            title: title.into(),
            description: "details".into(),
        }
    }

    #[test]
    fn usage_lists_every_command() {
        let response = usage();
        assert_eq!(response.response_type, ResponseType::Ephemeral);
        let text = response.text.unwrap();
        assert!(text.starts_with("Usage:\n- `/todo`: prints this usage"));
        assert_eq!(text.lines().count(), 6);
        assert!(text.ends_with("identified by the given KEY"));
    }

    #[test]
    fn empty_summary() {
        assert_eq!(summarize(&[]), "No task found.");
    }

    #[test]
    fn summary_table() {
        let text = summarize(&[todo(1, "K1", "first"), todo(2, "K2", "second")]);
        assert_eq!(
            text,
            "---\n\
             ### Tasks of channel\n\
             \n\
             | ID | Task | Created By | Created At | Key |\n\
             |:-------:|:--------|:-------:|:-------:|:-------:|\n\
             | 1 | first | alice | 2024-05-01T10:00:00.000Z | K1 |\n\
             | 2 | second | alice | 2024-05-01T10:00:00.000Z | K2 |\n\
             ---"
        );
    }

    #[test]
    fn ephemeral_text_omits_attachments() {
        let json = serde_json::to_value(created(&todo(1, "K1", "x"))).unwrap();
        assert_eq!(
            json,
            json!({
                "response_type": "ephemeral",
                "text": "new task created under key: K1"
            })
        );
    }

    #[test]
    fn detail_card_carries_close_action() {
        let json = serde_json::to_value(detail(&todo(4, "K4", "ship"), "tok", "https://hooks.example"))
            .unwrap();

        assert_eq!(json["response_type"], "in_channel");
        assert!(json.get("text").is_none());
        let attachment = &json["attachments"][0];
        assert_eq!(attachment["fallback"], "ship by alice on 2024-05-01T10:00:00.000Z");
        assert_eq!(attachment["color"], "#97a1ff");
        assert_eq!(attachment["text"], "details");
        assert_eq!(attachment["author_name"], "alice");
        assert_eq!(
            attachment["fields"],
            json!([
                {"short": false, "title": "Creation date", "value": "2024-05-01T10:00:00.000Z"},
                {"short": true, "title": "Key", "value": "K4"},
                {"short": true, "title": "Id", "value": 4}
            ])
        );
        assert_eq!(
            attachment["actions"][0],
            json!({
                "name": "☠ Close",
                "color": null,
                "integration": {
                    "url": "https://hooks.example/todoClose",
                    "context": {
                        "id": 4,
                        "key": "K4",
                        "token": "tok",
                        "teamId": "T1",
                        "channelId": "C1"
                    }
                }
            })
        );
    }

    #[test]
    fn action_request_tolerates_missing_fields() {
        let request: ActionRequest = serde_json::from_value(json!({
            "user_id": "u1",
            "context": {"key": "K1", "token": "tok"}
        }))
        .unwrap();
        let context = request.context.unwrap();
        assert_eq!(context.key, "K1");
        assert_eq!(context.team_id, "");

        let bare: ActionRequest = serde_json::from_value(json!({})).unwrap();
        assert!(bare.context.is_none());
    }

    #[test]
    fn closed_reply() {
        let at = Utc.timestamp_millis_opt(1_714_557_600_000).unwrap();
        assert_eq!(
            serde_json::to_value(closed("K1", &at)).unwrap(),
            json!({
                "update": {"message": "Task has been completed on 2024-05-01T10:00:00.000Z"},
                "ephemeral_text": "You completed the task[K1]!"
            })
        );
    }
}

//! Webhooks called by the chat platform.
//!
//! [`slash_todo`] answers the form-encoded `/todo` slash command and
//! [`todo_close`] answers the JSON callback of the "Close" button attached to
//! a detail card. Both check the shared integration token before touching the
//! store; store failures are turned into ephemeral chat texts since the
//! platform only renders `200` replies.

use crate::server::{
    service::{AppState, unauthorized},
    telemetry::{
        increment_store_errors, increment_todos_added, increment_todos_closed,
        increment_unauthorized, record_command, record_command_duration,
    },
};
use axum::{
    Form, Json,
    extract::{
        State,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use slashtodo::{ActionRequest, ChannelKey, Command, Error, NewTodo, format, parse_id};
use std::time::Instant;

/// Form body of a slash command delivery.
///
/// Only the fields the service reads are declared; the platform sends more.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlashRequest {
    pub token: Option<String>,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
}

impl SlashRequest {
    fn channel(&self) -> ChannelKey {
        ChannelKey::new(&self.team_id, &self.channel_id)
    }
}

#[tracing::instrument(
    skip_all,
    fields(team_id, channel_id, user_id, command = tracing::field::Empty)
)]
pub async fn slash_todo(
    State(state): State<AppState>,
    form: Result<Form<SlashRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) if state.tokens.accepts(request.token.as_deref()) => request,
        Ok(_) => {
            tracing::warn!("slash command with an unknown token");
            increment_unauthorized("slashTodo");
            return unauthorized();
        }
        Err(rejection) => {
            tracing::warn!(%rejection, "malformed slash command");
            increment_unauthorized("slashTodo");
            return unauthorized();
        }
    };

    let span = tracing::Span::current();
    span.record("team_id", request.team_id.as_str());
    span.record("channel_id", request.channel_id.as_str());
    span.record("user_id", request.user_id.as_str());

    let command = Command::parse(&request.text);
    let name = command.name();
    span.record("command", name);
    record_command(name);

    let started = Instant::now();
    let response = dispatch(&state, &request, command).await;
    record_command_duration(name, started.elapsed().as_secs_f64() * 1000.0);
    response
}

async fn dispatch(state: &AppState, request: &SlashRequest, command: Command) -> Response {
    let repository = &state.repository;
    let channel = request.channel();

    match command {
        Command::Usage => Json(format::usage()).into_response(),
        Command::List => match repository.list(&channel).await {
            Ok(todos) => Json(format::list(&todos)).into_response(),
            Err(err) => {
                report_store_error("list", &err);
                Json(format::list_failed(&err)).into_response()
            }
        },
        Command::Add { title, description } => {
            let new = NewTodo {
                team_id: request.team_id.clone(),
                channel_id: request.channel_id.clone(),
                user_name: request.user_name.clone(),
                user_id: request.user_id.clone(),
                title,
                description,
            };
            match repository.add(new).await {
                Ok(todo) => {
                    increment_todos_added();
                    tracing::info!(id = todo.id, key = %todo.key, "todo created");
                    Json(format::created(&todo)).into_response()
                }
                Err(err) => {
                    report_store_error("add", &err);
                    Json(format::creation_failed(&err)).into_response()
                }
            }
        }
        Command::Key(None) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no key given to retrieve todo item" })),
        )
            .into_response(),
        Command::Key(Some(key)) => match repository.find_by_key(&channel, &key).await {
            Ok(todo) => detail(state, request, &todo),
            Err(err) => {
                report_store_error("find_by_key", &err);
                Json(format::no_task_with_key(&key)).into_response()
            }
        },
        Command::Detail(raw) => {
            let Some(id) = parse_id(&raw) else {
                return Json(format::no_task_with_id(&raw)).into_response();
            };
            match repository.find_by_id(&channel, id).await {
                Ok(todo) => detail(state, request, &todo),
                Err(err) => {
                    report_store_error("find_by_id", &err);
                    Json(format::no_task_with_id(&raw)).into_response()
                }
            }
        }
    }
}

fn detail(state: &AppState, request: &SlashRequest, todo: &slashtodo::Todo) -> Response {
    let token = request.token.as_deref().unwrap_or_default();
    Json(format::detail(todo, token, &state.base_url)).into_response()
}

/// Logs and counts failures that did not come from the caller's input.
fn report_store_error(operation: &'static str, err: &Error) {
    if err.is_client_error() {
        tracing::debug!(operation, %err, "request rejected");
    } else {
        tracing::error!(operation, %err, "store operation failed");
        increment_store_errors(operation);
    }
}

#[tracing::instrument(skip_all, fields(user_id, key = tracing::field::Empty))]
pub async fn todo_close(
    State(state): State<AppState>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(%rejection, "malformed action callback");
            increment_unauthorized("todoClose");
            return unauthorized();
        }
    };
    let Some(context) = request
        .context
        .filter(|context| state.tokens.accepts(Some(&context.token)))
    else {
        tracing::warn!("action callback with an unknown token");
        increment_unauthorized("todoClose");
        return unauthorized();
    };

    let span = tracing::Span::current();
    span.record("user_id", request.user_id.as_str());
    span.record("key", context.key.as_str());

    let channel = ChannelKey::new(&context.team_id, &context.channel_id);
    match state
        .repository
        .close(&channel, &context.key, &request.user_id)
        .await
    {
        Ok(todo) => {
            increment_todos_closed();
            tracing::info!(id = todo.id, "todo closed");
            let now = state.repository.mint().now();
            Json(format::closed(&todo.key, &now)).into_response()
        }
        Err(err) => {
            report_store_error("close", &err);
            Json(format::close_failed(&context.key, &err)).into_response()
        }
    }
}

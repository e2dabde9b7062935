//! Scoped maintenance endpoints.
//!
//! Both endpoints take an optional `team_id` / `channel_id` pair narrowing
//! what they touch, and a secret in the `token` query parameter or header.
//! The secret must belong to an admin token whose scope covers the request.

use crate::server::{
    service::{AppState, unauthorized},
    telemetry::{increment_store_errors, increment_unauthorized},
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use slashtodo::{AdminScope, ChannelRecord};
use std::collections::BTreeMap;

const TOKEN_HEADER: &str = "token";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminQuery {
    pub token: Option<String>,
    pub team_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Resolves the requested scope, or the response rejecting the request.
fn authorize(
    state: &AppState,
    endpoint: &'static str,
    headers: &HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Result<AdminScope, Response> {
    let Query(query) = query.map_err(|rejection| {
        (StatusCode::BAD_REQUEST, format!("error:{rejection}")).into_response()
    })?;

    let scope = AdminScope::requested(query.team_id.as_deref(), query.channel_id.as_deref())
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("error:{err}")).into_response())?;

    let secret = query
        .token
        .as_deref()
        .or_else(|| headers.get(TOKEN_HEADER).and_then(|value| value.to_str().ok()))
        .unwrap_or_default();

    if !state.admin_tokens.authorize(secret, &scope) {
        tracing::warn!(endpoint, ?scope, "admin request not authorized");
        increment_unauthorized(endpoint);
        return Err(unauthorized());
    }
    Ok(scope)
}

/// Dumps every channel record in scope, keyed by `{team}-{channel}`.
#[tracing::instrument(skip_all)]
pub async fn read_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Response {
    let scope = match authorize(&state, "readAll", &headers, query) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    match state.repository.snapshot(&scope).await {
        Ok(records) if records.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(records) => {
            let records: BTreeMap<String, ChannelRecord> = records
                .into_iter()
                .map(|record| (record.key().to_string(), record))
                .collect();
            Json(records).into_response()
        }
        Err(err) => {
            tracing::error!(%err, "failed to read channel records");
            increment_store_errors("snapshot");
            (StatusCode::BAD_REQUEST, format!("error:{err}")).into_response()
        }
    }
}

/// Deletes every channel record in scope.
#[tracing::instrument(skip_all)]
pub async fn clean_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Response {
    let scope = match authorize(&state, "cleanAll", &headers, query) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    match state.repository.purge(&scope).await {
        Ok(removed) => {
            tracing::info!(?scope, removed, "channel records purged");
            "done".into_response()
        }
        Err(err) => {
            tracing::error!(%err, "failed to purge channel records");
            increment_store_errors("purge");
            (StatusCode::BAD_REQUEST, format!("error:{err}")).into_response()
        }
    }
}

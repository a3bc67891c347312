//! Route handlers.
//!
//! Bodies are taken as raw bytes and parsed here so malformed JSON is
//! reported through the same `invalid_payload` error shape as every other
//! rejected request.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::ApiError;
use crate::supervisor::{redact_token, Supervisor, WorkerInfo};
use crate::AppError;

/// Presence values accepted by `/status`.
pub const VALID_STATUSES: &[&str] = &["online", "offline", "dnd", "idle", "invisible"];

/// Activity kinds accepted by `/status`.
pub const VALID_ACTIVITY_TYPES: &[&str] = &[
    "playing",
    "streaming",
    "listening",
    "watching",
    "custom",
    "competing",
];

type ApiResult<T> = std::result::Result<T, ApiError>;

pub(crate) async fn root() -> &'static str {
    "Hello, World!"
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn list_bots(State(supervisor): State<Supervisor>) -> Json<Vec<WorkerInfo>> {
    Json(supervisor.list().await)
}

#[derive(Debug, Default, Deserialize)]
struct CreateBody {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    intents: Option<Value>,
}

pub(crate) async fn create_bot(
    State(supervisor): State<Supervisor>,
    Path(token): Path<String>,
    body: Bytes,
) -> ApiResult<Json<WorkerInfo>> {
    let request: CreateBody = parse_body(&body)?.unwrap_or_default();

    let data = match request.data {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(data @ Value::Object(_)) => data,
        Some(_) => {
            return Err(invalid("'data' must be a JSON object"));
        }
    };

    let intents = match request.intents {
        None | Some(Value::Null) => supervisor.config().default_intents.clone(),
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_owned(),
        Some(Value::Number(number)) if number.is_u64() => number.to_string(),
        Some(_) => {
            return Err(invalid(
                "'intents' must be a non-empty string or a non-negative integer",
            ));
        }
    };

    let payload = serde_json::to_string(&data)
        .map_err(|err| invalid(format!("unserializable 'data': {err}")))?;

    let info = supervisor
        .start_with_args(&token, &payload, vec![intents])
        .await?;
    Ok(Json(info))
}

pub(crate) async fn stop_bot(
    State(supervisor): State<Supervisor>,
    Path(token): Path<String>,
) -> ApiResult<Json<Value>> {
    supervisor.stop(&token).await?;
    Ok(Json(json!({ "token": redact_token(&token), "status": "stopped" })))
}

pub(crate) async fn update_bot(
    State(supervisor): State<Supervisor>,
    Path(token): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let Some(value) = parse_body::<Value>(&body)? else {
        return Err(invalid("request body must be a JSON object"));
    };
    if !value.is_object() {
        return Err(invalid("request body must be a JSON object"));
    }

    let message = serde_json::to_string(&value)
        .map_err(|err| invalid(format!("unserializable body: {err}")))?;
    supervisor.send(&token, message).await?;
    Ok(Json(json!({ "status": "sent" })))
}

#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    activity: Option<String>,
    #[serde(default)]
    activity_status: Option<String>,
    #[serde(default)]
    activity_url: Option<String>,
    #[serde(default)]
    activity_type: Option<String>,
}

/// Message a worker receives for a presence change.
#[derive(Debug, Serialize)]
struct StatusCommand<'a> {
    command: &'static str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    activity: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    activity_status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    activity_url: Option<&'a str>,
    activity_type: &'a str,
}

pub(crate) async fn update_status(
    State(supervisor): State<Supervisor>,
    Path(token): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let request: StatusBody = parse_body(&body)?.unwrap_or_default();

    let status = request.status.as_deref().unwrap_or("online");
    if !VALID_STATUSES.contains(&status) {
        return Err(invalid(format!(
            "unknown status '{status}'; expected one of {VALID_STATUSES:?}"
        )));
    }

    let activity_type = request.activity_type.as_deref().unwrap_or("playing");
    if !VALID_ACTIVITY_TYPES.contains(&activity_type) {
        return Err(invalid(format!(
            "unknown activity_type '{activity_type}'; expected one of {VALID_ACTIVITY_TYPES:?}"
        )));
    }

    let command = StatusCommand {
        command: "update_status",
        status,
        activity: request.activity.as_deref(),
        activity_status: request.activity_status.as_deref(),
        activity_url: request.activity_url.as_deref(),
        activity_type,
    };
    let message = serde_json::to_string(&command)
        .map_err(|err| invalid(format!("unserializable status command: {err}")))?;

    supervisor.send(&token, message).await?;
    Ok(Json(json!({ "status": "sent" })))
}

/// Parse a JSON body; `None` when it is empty or whitespace.
fn parse_body<T>(body: &Bytes) -> ApiResult<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| invalid(format!("malformed JSON body: {err}")))
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError(AppError::InvalidPayload(message.into()))
}

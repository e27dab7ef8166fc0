//! Phoenix channel protocol messages used by Supabase Realtime.

use chrono::{DateTime, Utc};
use saathi_backend::{ChangeKind, ChannelRequest, RowChange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const PHX_JOIN: &str = "phx_join";
pub(crate) const PHX_LEAVE: &str = "phx_leave";
pub(crate) const PHX_REPLY: &str = "phx_reply";
pub(crate) const PHX_ERROR: &str = "phx_error";
pub(crate) const PHX_CLOSE: &str = "phx_close";
pub(crate) const HEARTBEAT: &str = "heartbeat";
pub(crate) const POSTGRES_CHANGES: &str = "postgres_changes";
pub(crate) const SYSTEM: &str = "system";

const PHOENIX_TOPIC: &str = "phoenix";
const SCHEMA: &str = "public";

/// A message sent to/from the Realtime server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Create a `phx_join` for a postgres_changes channel.
    ///
    /// One change listener per watched kind, or a single `*` listener when
    /// every kind is watched. Each listener carries the owner filter.
    pub fn join(
        topic: &str,
        request: &ChannelRequest,
        access_token: Option<&str>,
        reference: &str,
    ) -> Self {
        let filter = request.filter_expression();
        let listeners: Vec<Value> = if request.kinds.is_all() {
            vec![json!({
                "event": "*",
                "schema": SCHEMA,
                "table": request.table,
                "filter": filter,
            })]
        } else {
            request
                .kinds
                .iter()
                .map(|kind| {
                    json!({
                        "event": kind.as_str(),
                        "schema": SCHEMA,
                        "table": request.table,
                        "filter": filter,
                    })
                })
                .collect()
        };

        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": listeners,
                "private": false,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }

        Self {
            topic: topic.to_string(),
            event: PHX_JOIN.to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    /// Create a `phx_leave` message.
    pub fn leave(topic: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: PHX_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Create a socket-level heartbeat.
    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Interpret a `phx_reply` payload.
    pub fn reply(&self) -> Option<JoinReply> {
        if self.event != PHX_REPLY {
            return None;
        }
        let status = self.payload.get("status").and_then(Value::as_str)?;
        if status == "ok" {
            return Some(JoinReply::Ok);
        }
        let reason = self
            .payload
            .get("response")
            .and_then(|response| {
                response
                    .get("reason")
                    .or_else(|| response.get("message"))
                    .and_then(Value::as_str)
            })
            .unwrap_or(status)
            .to_string();
        Some(JoinReply::Error(reason))
    }

    /// Decode a `postgres_changes` payload into a row change.
    pub fn row_change(&self) -> Option<RowChange> {
        if self.event != POSTGRES_CHANGES {
            return None;
        }
        let data = self.payload.get("data")?;
        let kind = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)?;
        let table = data.get("table").and_then(Value::as_str)?.to_string();

        Some(RowChange {
            table,
            kind,
            record: non_empty_record(data.get("record")),
            old_record: non_empty_record(data.get("old_record")),
            commit_timestamp: data
                .get("commit_timestamp")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|at| at.with_timezone(&Utc)),
        })
    }

    /// A `system` message reporting that the server could not set up the
    /// change listeners for this channel.
    pub fn system_error(&self) -> Option<String> {
        if self.event != SYSTEM {
            return None;
        }
        let status = self.payload.get("status").and_then(Value::as_str)?;
        if status != "error" {
            return None;
        }
        Some(
            self.payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )
    }
}

fn non_empty_record(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Object(fields)) if !fields.is_empty() => Some(Value::Object(fields.clone())),
        _ => None,
    }
}

/// Outcome of a `phx_join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinReply {
    Ok,
    Error(String),
}

//! Wire types for the subset of the Chrome DevTools Protocol the client
//! speaks. CDP multiplexes two message shapes over one socket: command
//! responses (correlated by `id`) and events (named, unsolicited). Neither
//! carries a discriminant tag, so we sniff on the presence of `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub struct CdpErrorPayload {
    pub code: i64,
    pub message: String,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<CdpErrorPayload>,
    },
    Event {
        method: String,
        params: Value,
    },
}

impl IncomingMessage {
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;
        if let Some(id) = object.get("id").and_then(Value::as_u64) {
            let result = object.get("result").cloned();
            let error = object
                .get("error")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok());
            Some(IncomingMessage::Response { id, result, error })
        } else {
            let method = object.get("method")?.as_str()?.to_string();
            let params = object.get("params").cloned().unwrap_or(Value::Null);
            Some(IncomingMessage::Event { method, params })
        }
    }
}

/// A browser debug target as returned by `GET /json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser")]
    pub browser: String,
}

// src/ipc/protocol.rs
// NDJSON protocol types for hook-to-daemon IPC (spec.md §6, §8).
//
// Unlike an {op, id, params} envelope, a request here is a flat
// `{event, ...payload}` object: the event name is a sibling of its own
// fields, not nested under a `params` key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct IpcRequest {
    pub event: String,
    #[serde(flatten)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct IpcResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn success(result: Value) -> Self {
        Self { ok: true, result: Some(result), error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { ok: false, result: None, error: Some(message.into()) }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecollectPayload {
    pub prompt: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_flat_event_shape() {
        let raw = r#"{"event": "recollect", "prompt": "fix the bug", "sessionId": "abc123"}"#;
        let req: IpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.event, "recollect");
        let payload: RecollectPayload = serde_json::from_value(req.payload).unwrap();
        assert_eq!(payload.prompt, "fix the bug");
        assert_eq!(payload.session_id, "abc123");
    }

    #[test]
    fn success_response_serializes_without_error_key() {
        let resp = IpcResponse::success(serde_json::json!({"bites": []}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"bites\":[]"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn error_response_serializes_without_result_keys() {
        let resp = IpcResponse::error("daemon busy");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"ok\":false"));
        assert!(json.contains("daemon busy"));
    }
}

//! JSON-RPC 2.0 message types for the LSP wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: i64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// A decoded incoming frame.
#[derive(Debug)]
pub enum Incoming {
    Response(Response),
    Notification { method: String, params: Value },
    /// A server-to-client request; we answer these with a null result.
    Request { id: Value, method: String },
}

/// Classify a decoded frame. Frames with a `method` are notifications (or
/// server requests when they also carry an `id`); everything else must be a
/// response.
pub fn classify(value: &Value) -> Option<Incoming> {
    if let Some(method) = value.get("method").and_then(Value::as_str) {
        if let Some(id) = value.get("id") {
            return Some(Incoming::Request {
                id: id.clone(),
                method: method.to_string(),
            });
        }
        return Some(Incoming::Notification {
            method: method.to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        });
    }
    serde_json::from_value::<Response>(value.clone())
        .ok()
        .map(Incoming::Response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_serialize_with_the_protocol_version() {
        let request = Request::new(7, "initialize", Some(json!({"a": 1})));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "initialize");
        assert_eq!(value["params"]["a"], 1);
    }

    #[test]
    fn notifications_omit_missing_params() {
        let notification = Notification::new("initialized", None);
        let value = serde_json::to_value(&notification).unwrap();
        assert!(value.get("params").is_none());
    }

    #[test]
    fn classification() {
        let response = classify(&json!({"jsonrpc": "2.0", "id": 3, "result": {}})).unwrap();
        assert!(matches!(response, Incoming::Response(r) if r.id == 3));

        let notification = classify(&json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": "file:///x"}
        }))
        .unwrap();
        assert!(
            matches!(notification, Incoming::Notification { method, .. } if method == "textDocument/publishDiagnostics")
        );

        let server_request = classify(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "workspace/configuration",
            "params": {}
        }))
        .unwrap();
        assert!(matches!(server_request, Incoming::Request { .. }));
    }

    #[test]
    fn error_responses_decode() {
        let incoming = classify(&json!({
            "jsonrpc": "2.0",
            "id": 9,
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        match incoming {
            Incoming::Response(response) => {
                let error = response.error.unwrap();
                assert_eq!(error.code, -32601);
                assert_eq!(error.message, "method not found");
            }
            _ => panic!("expected a response"),
        }
    }
}

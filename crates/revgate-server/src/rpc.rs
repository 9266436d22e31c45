//! JSON-RPC 2.0 framing helpers.

use serde::Deserialize;
use serde_json::{json, Value};

/// Protocol revision advertised during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported in `serverInfo`. The editor extension matches
/// on this value.
pub const SERVER_NAME: &str = "review-gate-v2";

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;

/// One incoming request line. `id` is absent for notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

pub fn result_response(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn error_response(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// Tool call result payload: a single text content block, with the
/// error marker set when the client should render it as a failure.
pub fn text_result(text: &str, is_error: bool) -> Value {
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_id_is_a_notification() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#)
                .unwrap();
        assert!(request.id.is_none());
        assert_eq!(request.method, "notifications/initialized");
        assert!(request.params.is_null());
    }

    #[test]
    fn result_frames_echo_the_request_id() {
        let frame = result_response(Some(json!(42)), json!({"ok": true}));
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["id"], 42);
        assert_eq!(frame["result"]["ok"], true);
    }

    #[test]
    fn error_frames_carry_code_and_message() {
        let frame = error_response(None, PARSE_ERROR, "Parse error");
        assert!(frame["id"].is_null());
        assert_eq!(frame["error"]["code"], -32700);
        assert_eq!(frame["error"]["message"], "Parse error");
    }

    #[test]
    fn text_results_only_mark_errors_when_asked() {
        let ok = text_result("done", false);
        assert_eq!(ok["content"][0]["type"], "text");
        assert_eq!(ok["content"][0]["text"], "done");
        assert!(ok.get("isError").is_none());

        let failed = text_result("broken", true);
        assert_eq!(failed["isError"], true);
    }
}

//! Line-delimited JSON-RPC framing for the tool-server wire protocol
//! (spec §4.A / §6). Each message is a single JSON object terminated by a
//! newline, in either direction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// Parse one line of the reader stream into a response frame. Lines that
/// aren't valid JSON-RPC responses (e.g. blank keepalive lines) are skipped
/// by returning `Ok(None)`.
pub fn parse_response_line(line: &str) -> serde_json::Result<Option<RpcResponse>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_trailing_newline() {
        let req = RpcRequest::new(1, "initialize", serde_json::json!({}));
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn blank_line_parses_to_none() {
        assert!(parse_response_line("   ").unwrap().is_none());
    }

    #[test]
    fn response_with_error_parses() {
        let line = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-1,"message":"boom"}}"#;
        let resp = parse_response_line(line).unwrap().unwrap();
        assert_eq!(resp.id, Some(3));
        assert_eq!(resp.error.unwrap().message, "boom");
    }
}

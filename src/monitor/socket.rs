/// JSON-RPC shapes for the account-subscription socket

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request sent over the WebSocket or the HTTP query endpoint.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    /// Account-change subscription with parsed-JSON encoding at finalized
    /// commitment.
    pub fn account_subscribe(address: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: "accountSubscribe".to_string(),
            params: serde_json::json!([
                address,
                {
                    "encoding": "jsonParsed",
                    "commitment": "finalized"
                }
            ]),
        }
    }

    /// Most recent transaction signatures for an address, newest first.
    pub fn signatures_for_address(address: &str, limit: usize) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: "getSignaturesForAddress".to_string(),
            params: serde_json::json!([address, { "limit": limit }]),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Classified inbound socket message.
#[derive(Debug)]
pub enum InboundMessage {
    /// Subscription acknowledgement: carries a `result` field and no
    /// `method`. Only the first one matters (it completes the connect
    /// handshake); the rest are ignored.
    SubscribeAck,
    /// The watched account changed on-chain.
    AccountChange,
    /// Error reported by the RPC node.
    RpcError(String),
    /// Anything else (other notification methods, pings in text form).
    Other,
}

/// Classifies one inbound text frame. Malformed JSON surfaces as an error
/// for the caller to log and drop.
pub fn classify_message(text: &str) -> Result<InboundMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(error) = value.get("error") {
        let detail = serde_json::from_value::<JsonRpcError>(error.clone())
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or_else(|_| error.to_string());
        return Ok(InboundMessage::RpcError(detail));
    }

    match value.get("method").and_then(Value::as_str) {
        Some("accountNotification") => Ok(InboundMessage::AccountChange),
        Some(_) => Ok(InboundMessage::Other),
        None if value.get("result").is_some() => Ok(InboundMessage::SubscribeAck),
        None => Ok(InboundMessage::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_shape() {
        let request = JsonRpcRequest::account_subscribe("some-address");
        let encoded = serde_json::to_value(&request).unwrap();

        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["method"], "accountSubscribe");
        assert_eq!(encoded["params"][0], "some-address");
        assert_eq!(encoded["params"][1]["encoding"], "jsonParsed");
        assert_eq!(encoded["params"][1]["commitment"], "finalized");
    }

    #[test]
    fn ack_is_result_without_method() {
        let message = r#"{"jsonrpc":"2.0","id":1,"result":23784}"#;
        assert!(matches!(
            classify_message(message).unwrap(),
            InboundMessage::SubscribeAck
        ));
    }

    #[test]
    fn account_notification_is_account_change() {
        let message = r#"{
            "jsonrpc": "2.0",
            "method": "accountNotification",
            "params": { "subscription": 23784, "result": { "context": { "slot": 1 }, "value": {} } }
        }"#;
        assert!(matches!(
            classify_message(message).unwrap(),
            InboundMessage::AccountChange
        ));
    }

    #[test]
    fn unknown_method_is_other() {
        let message = r#"{"jsonrpc":"2.0","method":"slotNotification","params":{}}"#;
        assert!(matches!(
            classify_message(message).unwrap(),
            InboundMessage::Other
        ));
    }

    #[test]
    fn rpc_error_is_surfaced() {
        let message = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid params"}}"#;
        match classify_message(message).unwrap() {
            InboundMessage::RpcError(detail) => assert!(detail.contains("Invalid params")),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(classify_message("not json at all").is_err());
    }
}

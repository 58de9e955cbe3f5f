/*
 *  control/rpc.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  JSON-RPC 2.0 envelopes and the control calls they carry
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kioskd_prop_api::Payload;

use crate::error::{codes, KioskError, RequestFault};

pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(codes::PARSE_ERROR, format!("Parse error: {}", detail))
    }

    pub fn invalid_request(detail: &str) -> Self {
        Self::new(codes::INVALID_REQUEST, format!("Invalid request: {}", detail))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }
}

impl From<&KioskError> for RpcError {
    fn from(err: &KioskError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<RequestFault> for RpcError {
    fn from(fault: RequestFault) -> Self {
        RpcError::from(&KioskError::MalformedRequest(fault))
    }
}

/// A JSON-RPC response; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A request envelope that passed the JSON-RPC shape checks
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,

    /// `None` for notifications, which get no response
    pub id: Option<Value>,
}

impl RpcRequest {
    /// Check the envelope of one decoded JSON value.
    ///
    /// On failure the id (if one could be read) comes back with the error
    /// so the caller can still answer.
    pub fn from_value(value: Value) -> Result<Self, (Value, RpcError)> {
        let Value::Object(mut object) = value else {
            return Err((Value::Null, RpcError::invalid_request("not an object")));
        };

        let id = object.remove("id");
        let reply_id = id.clone().unwrap_or(Value::Null);

        if let Some(version) = object.get("jsonrpc") {
            if version != JSONRPC_VERSION {
                return Err((reply_id, RpcError::invalid_request("jsonrpc must be \"2.0\"")));
            }
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err((reply_id, RpcError::invalid_request("missing method"))),
        };

        Ok(Self {
            method,
            params: object.remove("params"),
            id,
        })
    }
}

/// Create-or-update a prop
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub type_name: String,
    pub name: String,

    /// The whole params object, type-specific fields included
    pub payload: Payload,
}

/// The calls the host understands
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCall {
    Hello,
    ExitKiosk,
    Update(UpdateRequest),
    Destroy { type_name: String, name: String },
    ListProps,
    ListTypes,
}

fn addressed(params: Option<Value>) -> Result<(String, String, Payload), RequestFault> {
    let Some(Value::Object(payload)) = params else {
        return Err(RequestFault::NotAnObject);
    };

    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or(RequestFault::MissingName)?
        .to_string();
    let type_name = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or(RequestFault::MissingType)?
        .to_string();

    Ok((type_name, name, payload))
}

impl ControlCall {
    pub fn parse(method: &str, params: Option<Value>) -> Result<Self, RpcError> {
        match method {
            "Hello" => Ok(ControlCall::Hello),
            "ExitKiosk" => Ok(ControlCall::ExitKiosk),
            "ListProps" => Ok(ControlCall::ListProps),
            "ListTypes" => Ok(ControlCall::ListTypes),
            "Update" => {
                let (type_name, name, payload) = addressed(params)?;
                Ok(ControlCall::Update(UpdateRequest { type_name, name, payload }))
            }
            "Destroy" => {
                let (type_name, name, _) = addressed(params)?;
                Ok(ControlCall::Destroy { type_name, name })
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope() {
        let request = RpcRequest::from_value(json!({
            "jsonrpc": "2.0", "method": "Hello", "id": 7
        }))
        .unwrap();
        assert_eq!(request.method, "Hello");
        assert_eq!(request.id, Some(json!(7)));
        assert!(request.params.is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let request = RpcRequest::from_value(json!({"method": "Hello"})).unwrap();
        assert!(request.id.is_none());
    }

    #[test]
    fn test_bad_envelopes() {
        let (id, err) = RpcRequest::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(id, Value::Null);
        assert_eq!(err.code, -32600);

        let (id, err) = RpcRequest::from_value(json!({"id": "a", "method": 5})).unwrap_err();
        assert_eq!(id, json!("a"));
        assert_eq!(err.code, -32600);

        let (_, err) = RpcRequest::from_value(json!({"jsonrpc": "1.0", "method": "Hello"})).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn test_parse_update_keeps_payload() {
        let call = ControlCall::parse(
            "Update",
            Some(json!({"name": "clock", "type": "text", "x": 10, "text": "Hi"})),
        )
        .unwrap();

        let ControlCall::Update(update) = call else {
            panic!("expected an update");
        };
        assert_eq!(update.type_name, "text");
        assert_eq!(update.name, "clock");
        assert_eq!(update.payload.get("text"), Some(&json!("Hi")));
        assert_eq!(update.payload.get("x"), Some(&json!(10)));
    }

    #[test]
    fn test_parse_faults() {
        let code = |method: &str, params: Option<Value>| ControlCall::parse(method, params).unwrap_err().code;

        assert_eq!(code("Update", None), -43);
        assert_eq!(code("Update", Some(json!([1]))), -43);
        assert_eq!(code("Update", Some(json!({"type": "text"}))), -44);
        assert_eq!(code("Update", Some(json!({"name": 3, "type": "text"}))), -44);
        assert_eq!(code("Destroy", Some(json!({"name": "clock"}))), -45);
        assert_eq!(code("Reboot", None), -32601);
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(RpcResponse::success(json!(1), json!("Done"))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "result": "Done", "id": 1}));

        let err = serde_json::to_value(RpcResponse::failure(Value::Null, RpcError::new(-46, "nope"))).unwrap();
        assert_eq!(err, json!({"jsonrpc": "2.0", "error": {"code": -46, "message": "nope"}, "id": null}));
    }
}

//! Wire messages of the `Reverse` backend service.
//!
//! The messages are declared by hand with `prost` derives so the crate builds
//! without `protoc`. Tags match the backend's `.proto`; every scalar is
//! `optional` so "unset" and "empty" stay distinguishable.
//!
//! Arguments are `google.protobuf.Any` values. The gateway always packs a
//! `BytesValue` holding the JSON encoding of the argument and forwards what it
//! receives untouched.

use std::collections::HashMap;

use bytes::Bytes;
use prost::Message;
use prost_types::Any;

pub mod client;

pub use client::ReverseClient;

/// Fully qualified name of the backend service.
pub const SERVICE_NAME: &str = "Reverse";

pub const BYTES_VALUE_TYPE_URL: &str = "type.googleapis.com/google.protobuf.BytesValue";
pub const STRING_MAP_TYPE_URL: &str = "type.googleapis.com/StringMap";
pub const FILE_CHUNK_TYPE_URL: &str = "type.googleapis.com/FileChunk";

/// Request envelope sent to every backend.
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(string, optional, tag = "1")]
    pub module: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub param: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub param_id: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub action: Option<String>,
    #[prost(map = "string, message", tag = "5")]
    pub args: HashMap<String, Any>,
    #[prost(string, optional, tag = "6")]
    pub path: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub token: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub sign: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub ip: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub user_agent: Option<String>,
    #[prost(string, optional, tag = "11")]
    pub token_type: Option<String>,
    #[prost(int32, optional, tag = "12")]
    pub timestamp: Option<i32>,
    #[prost(string, optional, tag = "13")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "14")]
    pub api_version: Option<String>,
    #[prost(string, optional, tag = "15")]
    pub method: Option<String>,
    #[prost(string, optional, tag = "16")]
    pub uid: Option<String>,
    #[prost(int32, optional, tag = "17")]
    pub is_admin: Option<i32>,
    #[prost(int32, optional, tag = "18")]
    pub session_end: Option<i32>,
    #[prost(int32, optional, tag = "19")]
    pub completed: Option<i32>,
    #[prost(int32, optional, tag = "20")]
    pub readonly: Option<i32>,
    /// Gateway-originated calls (coordinator lookup, session check).
    #[prost(message, optional, tag = "21")]
    pub ir: Option<InternalRequest>,
}

#[derive(Clone, PartialEq, Message)]
pub struct InternalRequest {
    #[prost(string, optional, tag = "1")]
    pub param: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub method: Option<String>,
    #[prost(map = "string, message", tag = "3")]
    pub args: HashMap<String, Any>,
}

/// Response envelope returned by every backend.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(map = "string, message", tag = "1")]
    pub data: HashMap<String, Any>,
    /// The request as the backend left it; carries session updates.
    #[prost(message, optional, tag = "2")]
    pub request_back: Option<Request>,
}

/// One slice of an uploaded file.
#[derive(Clone, PartialEq, Message)]
pub struct FileChunk {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub data: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct StringMap {
    #[prost(map = "string, string", tag = "1")]
    pub entries: HashMap<String, String>,
}

/// Mirror of `google.protobuf.BytesValue`.
#[derive(Clone, PartialEq, Message)]
pub struct BytesValue {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

impl InternalRequest {
    pub fn new(param: &str, method: &str) -> Self {
        Self {
            param: Some(param.to_string()),
            method: Some(method.to_string()),
            args: HashMap::new(),
        }
    }
}

/// Pack a message into an `Any` under the given type URL.
pub fn pack<M: Message>(type_url: &str, message: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

/// Encode a JSON value as an opaque argument.
pub fn json_to_any(value: &serde_json::Value) -> Result<Any, serde_json::Error> {
    let encoded = serde_json::to_vec(value)?;
    Ok(pack(BYTES_VALUE_TYPE_URL, &BytesValue { value: encoded }))
}

/// Decode an opaque argument back to JSON.
///
/// Returns `None` for anything that is not a `BytesValue` carrying valid JSON.
pub fn any_to_json(any: &Any) -> Option<serde_json::Value> {
    if any.type_url != BYTES_VALUE_TYPE_URL {
        return None;
    }
    let wrapper = BytesValue::decode(any.value.as_slice()).ok()?;
    serde_json::from_slice(&wrapper.value).ok()
}

/// Unpack an `Any` expected to hold `M` under `type_url`.
pub fn unpack<M: Message + Default>(any: &Any, type_url: &str) -> Option<M> {
    if any.type_url != type_url {
        return None;
    }
    M::decode(any.value.as_slice()).ok()
}

/// Decode every argument that holds JSON, dropping the rest.
pub fn decode_map(map: &HashMap<String, Any>) -> serde_json::Map<String, serde_json::Value> {
    map.iter()
        .filter_map(|(key, any)| any_to_json(any).map(|value| (key.clone(), value)))
        .collect()
}

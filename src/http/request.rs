//! Inbound request decoding.
//!
//! # Responsibilities
//! - Resolve the client address behind proxies
//! - Extract the bearer token, language and request ID
//! - Build the backend envelope from path and headers
//! - Turn the query string or JSON body into envelope arguments
//!
//! # Design Decisions
//! - Read methods carry arguments in the query, write methods in a JSON body
//! - An empty body means no arguments; a body that is not a JSON object is 400
//! - Argument values are opaque to the gateway once packed

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::{header, HeaderMap, Method, Uri};
use prost_types::Any;
use serde_json::Value;

use crate::error::GatewayError;
use crate::proto::{json_to_any, Request};
use crate::routing::ApiPath;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Inbound signature, checked by the security gate.
pub const X_SIGN: &str = "x-sign";

/// Filename of a raw (non-multipart) upload.
pub const X_FILENAME: &str = "x-filename";

const BEARER: &str = "Bearer";

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(first) = header_str(headers, X_FORWARDED_FOR)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
    {
        return first.to_string();
    }
    if let Some(real) = header_str(headers, X_REAL_IP) {
        return real.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn request_id(headers: &HeaderMap) -> String {
    header_str(headers, X_REQUEST_ID)
        .unwrap_or("unknown")
        .to_string()
}

/// `(token_type, token)` from `Authorization: Bearer <token>`, falling back
/// to the `access_token` / `token_type` query parameters.
///
/// An `Authorization` header with any other scheme yields no token.
pub fn bearer_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<(String, String)> {
    if let Some(value) = header_str(headers, header::AUTHORIZATION) {
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case(BEARER) || token.is_empty() {
            tracing::debug!("ignoring non-bearer authorization header");
            return None;
        }
        return Some((BEARER.to_string(), token.to_string()));
    }

    let token = query.get("access_token").filter(|t| !t.is_empty())?;
    let token_type = query
        .get("token_type")
        .filter(|t| !t.is_empty())
        .cloned()
        .unwrap_or_else(|| BEARER.to_string());
    Some((token_type, token.clone()))
}

/// Primary tag of `Accept-Language`, e.g. `en-US` from `en-US,en;q=0.9`.
pub fn language(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::ACCEPT_LANGUAGE)?
        .split(',')
        .next()
        .and_then(|tag| tag.split(';').next())
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .map(str::to_string)
}

/// Raw query pairs. A malformed query string is a client error.
pub fn query_pairs(uri: &Uri) -> Result<HashMap<String, String>, GatewayError> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .map_err(|e| GatewayError::BadRequest(e.body_text()))
}

/// Build the backend envelope for a routed request. Arguments are filled in
/// separately.
pub fn init_envelope(
    path: &ApiPath,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    query: &HashMap<String, String>,
) -> Request {
    let mut envelope = Request {
        module: Some(path.module.clone()),
        param: path.param.clone(),
        param_id: path.param_id.clone(),
        path: Some(uri.path().to_string()),
        method: Some(method.as_str().to_string()),
        ip: Some(client_ip(headers, peer)),
        user_agent: header_str(headers, header::USER_AGENT).map(str::to_string),
        api_version: Some(path.version.clone()),
        language: language(headers),
        ..Default::default()
    };
    if let Some((token_type, token)) = bearer_token(headers, query) {
        envelope.token_type = Some(token_type);
        envelope.token = Some(token);
    }
    envelope
}

/// Query pairs as arguments. Empty values are dropped.
pub fn query_args(query: &HashMap<String, String>) -> Result<HashMap<String, Any>, GatewayError> {
    query
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| Ok((key.clone(), pack_arg(&Value::String(value.clone()))?)))
        .collect()
}

/// A JSON object body as arguments.
pub fn json_args(body: &[u8]) -> Result<HashMap<String, Any>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {e}")))?;
    let Value::Object(object) = value else {
        return Err(GatewayError::BadRequest("JSON body must be an object".into()));
    };
    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), pack_arg(value)?)))
        .collect()
}

fn pack_arg(value: &Value) -> Result<Any, GatewayError> {
    json_to_any(value).map_err(|e| GatewayError::BadRequest(format!("unencodable argument: {e}")))
}

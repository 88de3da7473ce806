//! Client-facing response rendering.
//!
//! Every successful answer has the same shape:
//! ```text
//! {"lang": "...", "timestamp": <unix>, "data": {...}, "session": {...}?}
//! ```
//! `httpcode` inside the backend data selects the HTTP status and is removed
//! from `data`. A string `Content-Type` key replaces the JSON content type
//! and is removed as well. `session` is present once the envelope carries a
//! uid.
//!
//! Data carrying `file` is not rendered as JSON but sent as an attachment:
//! `file` is a path on the gateway host, or the content itself when
//! `isbase64` is true. `filename` and `filetype` name and type the download.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::proto::Request;
use crate::transport::UploadSummary;

const DEFAULT_LANGUAGE: &str = "eng";
const DEFAULT_FILENAME: &str = "download";
const DEFAULT_FILETYPE: &str = "application/octet-stream";

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// `httpcode` as a number or numeric string; anything else is ignored.
fn take_status(data: &mut Map<String, Value>) -> StatusCode {
    let code = match data.remove("httpcode") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    code.and_then(|c| u16::try_from(c).ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(StatusCode::OK)
}

fn session(envelope: &Request) -> Option<Value> {
    let uid = envelope.uid.as_ref()?;
    Some(json!({
        "uid": uid,
        "is_admin": envelope.is_admin,
        "session_end": envelope.session_end,
        "completed": envelope.completed,
        "readonly": envelope.readonly,
    }))
}

/// Answer with backend data: a download when it names a file, JSON otherwise.
pub async fn answer(data: Map<String, Value>, envelope: &Request) -> Response {
    match data.get("file").and_then(Value::as_str) {
        Some(file) => download(file, &data).await,
        None => render(data, envelope),
    }
}

/// Render decoded backend data for the client.
pub fn render(mut data: Map<String, Value>, envelope: &Request) -> Response {
    let status = take_status(&mut data);
    let content_type = match data.remove("Content-Type") {
        Some(Value::String(ct)) => HeaderValue::from_str(&ct).ok(),
        Some(other) => {
            data.insert("Content-Type".into(), other);
            None
        }
        None => None,
    };
    let lang = data
        .get("lang")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    let mut body = json!({
        "lang": lang,
        "timestamp": unix_now(),
        "data": data,
    });
    if let Some(session) = session(envelope) {
        body["session"] = session;
    }
    let mut response = (status, Json(body)).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
}

async fn download(file: &str, data: &Map<String, Value>) -> Response {
    let text = |key: &str| data.get(key).and_then(Value::as_str).filter(|v| !v.is_empty());
    let filename = text("filename").unwrap_or(DEFAULT_FILENAME);
    let inline = data.get("isbase64").and_then(Value::as_bool).unwrap_or(false);

    let content = if inline {
        file.as_bytes().to_vec()
    } else {
        match tokio::fs::read(file).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %file, error = %e, "file answer could not be read");
                return plain_error(StatusCode::NOT_FOUND, "file_not_found", format!("{filename} is not available"));
            }
        }
    };

    let content_type = text("filetype")
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_FILETYPE));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename.replace('"', "_")))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        Body::from(content),
    )
        .into_response()
}

/// Build information for the `info` module.
pub fn info() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        "version".into(),
        json!(format!(
            "{} ({}, {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("GATEWAY_GIT_COMMIT").unwrap_or("dev"),
            option_env!("GATEWAY_BUILD_DATE").unwrap_or("unknown"),
        )),
    );
    data
}

/// Empty answer to `OPTIONS`; the CORS headers come from the router.
pub fn options() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn upload(summary: UploadSummary, envelope: &Request) -> Response {
    let mut data = Map::new();
    data.insert("files".into(), json!(summary.files));
    data.insert("bytes".into(), json!(summary.bytes));
    data.insert("responses".into(), json!(summary.responses));
    render(data, envelope)
}

fn plain_error(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "httpcode": status.as_u16(),
            "code": code,
            "message": message,
        })),
    )
        .into_response()
}

pub fn not_found(path: &str) -> Response {
    plain_error(StatusCode::NOT_FOUND, "not_found", format!("no route for {path}"))
}

pub fn method_not_allowed(method: &str) -> Response {
    plain_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        format!("method {method} is not supported"),
    )
}

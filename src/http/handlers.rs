//! The API handler: one HTTP request in, one backend call out.
//!
//! ```text
//! OPTIONS answered with 204
//! parse /api/{version}/{module}[/{param}[/{param_id}]]
//!     → security gate (X-Sign / client certificate)
//!     → entrypoint refused
//!     → envelope init + outbound sign, arguments from query or JSON body
//!     → heartbeat answered locally or relayed to the coordinator
//!     → session check (when enabled and a token is present)
//!     → read-only sessions refused, info answered locally
//!     → PUT: streaming upload    other: unary call
//!     → render data, httpcode selects the status
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, FromRequest, Multipart, State};
use axum::http::{header, Method, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;
use crate::http::heartbeat;
use crate::http::request::{
    init_envelope, json_args, query_args, query_pairs, request_id, X_FILENAME, X_SIGN,
};
use crate::http::response;
use crate::http::server::AppState;
use crate::http::session::check_session;
use crate::net::tls::PeerIdentity;
use crate::observability::metrics;
use crate::proto::decode_map;
use crate::routing::ApiPath;
use crate::transport::{CallContext, UploadSource};

/// `/health`: the process is up. Backends are not contacted.
pub async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

pub async fn not_found(request: Request<Body>) -> Response {
    if request.method() == Method::OPTIONS {
        return response::options();
    }
    response::not_found(request.uri().path())
}

pub async fn api_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();

    let Some(path) = ApiPath::parse(request.uri().path()) else {
        metrics::record_request(&method, 404, "none", started);
        return response::not_found(request.uri().path());
    };
    let module = path.module.clone();

    let response = match handle(&state, path, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    metrics::record_request(&method, response.status().as_u16(), &module, started);
    response
}

fn is_supported(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::TRACE | Method::POST | Method::PATCH | Method::DELETE | Method::PUT
    )
}

async fn handle(state: &AppState, path: ApiPath, request: Request<Body>) -> Result<Response, GatewayError> {
    if request.method() == Method::OPTIONS {
        return Ok(response::options());
    }
    if !is_supported(request.method()) {
        return Ok(response::method_not_allowed(request.method().as_str()));
    }

    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = parts.extensions.get::<PeerIdentity>();
    let presented = parts.headers.get(X_SIGN).and_then(|v| v.to_str().ok());

    state.gate.authorize(&path.module, presented, identity)?;

    if path.is_entrypoint() {
        tracing::warn!(path = %parts.uri.path(), "refusing reserved module");
        return Ok(response::not_found(parts.uri.path()));
    }

    let query = query_pairs(&parts.uri)?;
    let mut envelope = init_envelope(&path, &parts.method, &parts.uri, &parts.headers, peer, &query);
    state.gate.stamp(&mut envelope);

    let ctx = CallContext::new(request_id.clone())
        .with_deadline(tokio::time::Instant::now() + state.request_timeout);

    // PUT keeps its body for the upload stream.
    let (args, upload_body) = match parts.method {
        Method::PUT => (HashMap::new(), Some(body)),
        Method::GET | Method::HEAD | Method::TRACE => (query_args(&query)?, None),
        _ => {
            let bytes = to_bytes(body, state.upload.max_body_bytes)
                .await
                .map_err(|e| GatewayError::BadRequest(format!("reading body: {e}")))?;
            (json_args(&bytes)?, None)
        }
    };

    if path.is_heartbeat() {
        let data = match &state.heartbeat_target {
            Some(coordinator) => heartbeat::relay(&state.dispatcher, &ctx, &state.gate, coordinator, args).await?,
            None => heartbeat::local_beat(),
        };
        return Ok(response::render(data, &envelope));
    }
    envelope.args = args;

    if state.session.enabled && envelope.token.is_some() {
        check_session(&state.dispatcher, &ctx, &state.session.service, &mut envelope).await;
    }
    if envelope.readonly == Some(1) {
        tracing::info!(request_id = %request_id, uid = ?envelope.uid, method = %parts.method, "read-only session refused");
        return Err(GatewayError::Forbidden("session is read-only".into()));
    }

    if path.is_info() {
        return Ok(response::render(response::info(), &envelope));
    }

    tracing::debug!(
        request_id = %request_id,
        module = %path.module,
        method = %parts.method,
        uid = ?envelope.uid,
        "dispatching request"
    );

    if let Some(body) = upload_body {
        let source = upload_source(state, Request::from_parts(parts, body)).await?;
        let summary = state.dispatcher.upload(&ctx, &path.module, &envelope, source).await?;
        return Ok(response::upload(summary, &envelope));
    }

    let reply = state
        .dispatcher
        .call(&ctx, &path.module, parts.method.as_str(), &mut envelope)
        .await?;
    Ok(response::answer(decode_map(&reply.data), &envelope).await)
}

async fn upload_source(state: &AppState, request: Request<Body>) -> Result<UploadSource, GatewayError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
        return Ok(UploadSource::Multipart(multipart));
    }

    let filename = request
        .headers()
        .get(X_FILENAME)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.upload.default_filename.clone());
    Ok(UploadSource::Single {
        filename,
        body: request.into_body(),
    })
}

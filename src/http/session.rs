//! Session check ahead of the forwarded call.
//!
//! The session service is asked `checksession` with a copy of the envelope.
//! Whatever it reports (in its data or in the echoed request) is copied onto
//! the envelope so the target module sees the caller's uid, admin flag and
//! read-only state. A failed check is logged and the request continues
//! without session data; the target module decides what that means.

use serde_json::{Map, Value};

use crate::proto::{decode_map, InternalRequest, Request};
use crate::transport::{propagate_session, CallContext, Dispatcher};

pub const CHECK_SESSION: &str = "checksession";

/// Ask `service` about the envelope's token and merge the answer.
pub async fn check_session(dispatcher: &Dispatcher, ctx: &CallContext, service: &str, envelope: &mut Request) {
    let mut check = envelope.clone();
    check.args.clear();
    check.ir = Some(InternalRequest::new(CHECK_SESSION, "GET"));

    match dispatcher.call(ctx, service, "GET", &mut check).await {
        Ok(response) => {
            let data = decode_map(&response.data);
            if let Some(code) = data.get("httpcode") {
                tracing::warn!(request_id = %ctx.request_id, service, httpcode = %code, "session check refused");
                return;
            }
            propagate_session(envelope, &check);
            apply_session_data(envelope, &data);
            tracing::debug!(request_id = %ctx.request_id, uid = ?envelope.uid, "session attached");
        }
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, service, error = %e, "session check failed, continuing without session");
        }
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i32::from(*b)),
        _ => None,
    }
}

/// Copy the session service's data keys onto the envelope.
pub fn apply_session_data(envelope: &mut Request, data: &Map<String, Value>) {
    if let Some(uid) = data.get("uid").and_then(as_string) {
        envelope.uid = Some(uid);
    }
    if let Some(flag) = data.get("isadmin").and_then(as_flag) {
        envelope.is_admin = Some(flag);
    }
    if let Some(end) = data.get("sessionend").and_then(as_flag) {
        envelope.session_end = Some(end);
    }
    if let Some(flag) = data.get("completed").and_then(as_flag) {
        envelope.completed = Some(flag);
    }
    if let Some(flag) = data.get("readonly").and_then(as_flag) {
        envelope.readonly = Some(flag);
    }
    if let Some(token) = data.get("token").and_then(as_string) {
        envelope.token = Some(token);
    }
    if let Some(token_type) = data.get("token_type").and_then(as_string) {
        envelope.token_type = Some(token_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::proto::{json_to_any, Response};
    use crate::transport::{Transport, UploadSource, UploadSummary};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct SessionService {
        data: Value,
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl Transport for SessionService {
        async fn call(
            &self,
            _ctx: &CallContext,
            service: &str,
            _http_method: &str,
            request: &Request,
        ) -> Result<Response, GatewayError> {
            self.seen.lock().unwrap().push(request.clone());
            if service != "sessionservice" {
                return Err(GatewayError::unavailable(service, "unknown"));
            }
            let data: HashMap<_, _> = self
                .data
                .as_object()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v).unwrap()))
                .collect();
            Ok(Response {
                data,
                request_back: None,
            })
        }

        async fn upload(
            &self,
            _ctx: &CallContext,
            _service: &str,
            _template: &Request,
            _source: UploadSource,
        ) -> Result<UploadSummary, GatewayError> {
            Ok(UploadSummary::default())
        }
    }

    fn setup(data: Value) -> (Dispatcher, Arc<SessionService>) {
        let service = Arc::new(SessionService {
            data,
            seen: Mutex::new(Vec::new()),
        });
        (Dispatcher::new(service.clone()), service)
    }

    fn envelope() -> Request {
        Request {
            module: Some("reports".into()),
            token: Some("tok".into()),
            args: HashMap::from([("q".to_string(), json_to_any(&json!("x")).unwrap())]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn session_data_lands_on_envelope() {
        let (dispatcher, service) = setup(json!({
            "uid": 17, "isadmin": "1", "readonly": true, "sessionend": 1700000000, "token_type": "Bearer"
        }));
        let mut request = envelope();
        check_session(&dispatcher, &CallContext::new("r"), "sessionservice", &mut request).await;

        assert_eq!(request.uid.as_deref(), Some("17"));
        assert_eq!(request.is_admin, Some(1));
        assert_eq!(request.readonly, Some(1));
        assert_eq!(request.session_end, Some(1_700_000_000));
        assert_eq!(request.token.as_deref(), Some("tok"));
        assert_eq!(request.args.len(), 1, "caller arguments survive");

        let seen = service.seen.lock().unwrap();
        let check = &seen[0];
        assert_eq!(check.ir.as_ref().unwrap().param.as_deref(), Some(CHECK_SESSION));
        assert!(check.args.is_empty());
        assert_eq!(check.token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn refusal_leaves_envelope_alone() {
        let (dispatcher, _) = setup(json!({"httpcode": 401, "uid": "ignored"}));
        let mut request = envelope();
        check_session(&dispatcher, &CallContext::new("r"), "sessionservice", &mut request).await;
        assert_eq!(request.uid, None);
    }

    #[tokio::test]
    async fn unreachable_service_is_not_fatal() {
        let (dispatcher, _) = setup(json!({}));
        let mut request = envelope();
        let before = request.clone();
        check_session(&dispatcher, &CallContext::new("r"), "elsewhere", &mut request).await;
        assert_eq!(request, before);
    }
}

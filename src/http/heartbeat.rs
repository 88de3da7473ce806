//! The `heartbeat` module.
//!
//! Without a coordinator the gateway answers for itself. With one, the beat
//! is relayed to it as an internal `heartbeat` POST carrying the caller's
//! arguments and a fresh `ts`. A reply carrying `httpcode` is a failed beat.

use std::collections::HashMap;

use prost_types::Any;
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::http::response::unix_now;
use crate::proto::{decode_map, json_to_any, InternalRequest, Request};
use crate::security::SecurityGate;
use crate::transport::{CallContext, Dispatcher};

pub const HEARTBEAT_SELECTOR: &str = "heartbeat";

/// What a gateway without a coordinator reports about itself.
pub fn local_beat() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("leader".into(), Value::Bool(true));
    data.insert("cron".into(), Value::Bool(true));
    data.insert("ttl".into(), json!(0));
    data.insert("epoch".into(), json!(0));
    data.insert("ts".into(), json!(unix_now()));
    data
}

/// Relay a heartbeat to `coordinator` and return its data.
pub async fn relay(
    dispatcher: &Dispatcher,
    ctx: &CallContext,
    gate: &SecurityGate,
    coordinator: &str,
    args: HashMap<String, Any>,
) -> Result<Map<String, Value>, GatewayError> {
    let mut beat = Request {
        module: Some(coordinator.to_string()),
        args,
        ir: Some(InternalRequest::new(HEARTBEAT_SELECTOR, "POST")),
        ..Default::default()
    };
    let ts = json_to_any(&json!(unix_now())).map_err(|e| GatewayError::Heartbeat(e.to_string()))?;
    beat.args.insert("ts".into(), ts);
    gate.stamp(&mut beat);

    let reply = dispatcher
        .call(ctx, coordinator, "POST", &mut beat)
        .await
        .map_err(|e| {
            tracing::warn!(request_id = %ctx.request_id, coordinator, error = %e, "heartbeat relay failed");
            GatewayError::Heartbeat(e.to_string())
        })?;

    let data = decode_map(&reply.data);
    if let Some(code) = data.get("httpcode") {
        tracing::warn!(request_id = %ctx.request_id, coordinator, httpcode = %code, "heartbeat refused");
        return Err(GatewayError::Heartbeat(format!("{coordinator} answered {code}")));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{any_to_json, Response};
    use crate::security::SecurityMode;
    use crate::transport::{Transport, UploadSource, UploadSummary};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Coordinator {
        reply: Value,
        seen: Mutex<Vec<(String, Request)>>,
    }

    #[async_trait]
    impl Transport for Coordinator {
        async fn call(
            &self,
            _ctx: &CallContext,
            service: &str,
            _http_method: &str,
            request: &Request,
        ) -> Result<Response, GatewayError> {
            self.seen.lock().unwrap().push((service.to_string(), request.clone()));
            let data = self
                .reply
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

    fn setup(reply: Value) -> (Dispatcher, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (Dispatcher::new(coordinator.clone()), coordinator)
    }

    fn gate() -> SecurityGate {
        SecurityGate::new(SecurityMode::StaticSign { sign: "s".into() })
    }

    #[test]
    fn local_beat_claims_leadership() {
        let beat = local_beat();
        assert_eq!(beat["leader"], true);
        assert_eq!(beat["epoch"], 0);
        assert!(beat["ts"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn relayed_beat_is_addressed_to_coordinator() {
        let (dispatcher, coordinator) = setup(json!({"leader": false, "epoch": 4}));
        let args = HashMap::from([("node".to_string(), json_to_any(&json!("n1")).unwrap())]);

        let data = relay(&dispatcher, &CallContext::new("r"), &gate(), "masterservice", args)
            .await
            .unwrap();
        assert_eq!(data["epoch"], 4);

        let seen = coordinator.seen.lock().unwrap();
        let (service, beat) = &seen[0];
        assert_eq!(service, "masterservice");
        assert_eq!(beat.module.as_deref(), Some("masterservice"));
        assert_eq!(beat.sign.as_deref(), Some("s"));
        let ir = beat.ir.as_ref().unwrap();
        assert_eq!(ir.param.as_deref(), Some(HEARTBEAT_SELECTOR));
        assert_eq!(ir.method.as_deref(), Some("POST"));
        assert_eq!(any_to_json(&beat.args["node"]), Some(json!("n1")));
        assert!(any_to_json(&beat.args["ts"]).unwrap().as_u64().is_some());
    }

    #[tokio::test]
    async fn httpcode_in_reply_fails_the_beat() {
        let (dispatcher, _) = setup(json!({"httpcode": 503}));
        let err = relay(&dispatcher, &CallContext::new("r"), &gate(), "masterservice", HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "heartbeat_failed");
        assert_eq!(err.status().as_u16(), 500);
    }
}

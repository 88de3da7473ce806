//! Location lookups against the coordinator service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use prost_types::Any;

use crate::error::GatewayError;
use crate::pool::{ConnectionPool, GrpcDialer, TlsSettings};
use crate::proto::{any_to_json, json_to_any, InternalRequest, Request, ReverseClient};
use crate::registry::cache::ServiceInfo;
use crate::registry::source::CoordinatorLookup;
use crate::security::SecurityGate;

/// Internal selector the coordinator answers location questions on.
pub const LOOKUP_SELECTOR: &str = "getmicroservicebypath";

/// Internal argument naming the service being looked up.
pub const TARGET_ARG: &str = "module";

/// Coordinator client that goes through the shared connection pool.
pub struct RpcCoordinator {
    name: String,
    pool: Arc<ConnectionPool<GrpcDialer>>,
    tls: TlsSettings,
    gate: Option<Arc<SecurityGate>>,
}

impl RpcCoordinator {
    /// `name` is the coordinator's own module name; lookups are addressed to it.
    pub fn new(name: impl Into<String>, pool: Arc<ConnectionPool<GrpcDialer>>, tls: TlsSettings) -> Self {
        Self {
            name: name.into(),
            pool,
            tls,
            gate: None,
        }
    }

    /// Sign lookups the same way forwarded requests are signed.
    pub fn with_gate(mut self, gate: Arc<SecurityGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// The request sent to `coordinator` when looking up `service`.
///
/// The envelope is addressed to the coordinator itself; the target travels in
/// the internal request's arguments.
pub fn lookup_request(coordinator: &str, service: &str) -> Result<Request, GatewayError> {
    let target = json_to_any(&serde_json::Value::String(service.to_string()))
        .map_err(|e| GatewayError::unavailable(service, format!("encoding lookup: {e}")))?;
    let mut ir = InternalRequest::new(LOOKUP_SELECTOR, "GET");
    ir.args.insert(TARGET_ARG.to_string(), target);
    Ok(Request {
        module: Some(coordinator.to_string()),
        ir: Some(ir),
        ..Default::default()
    })
}

/// The service a lookup request asks about, if any.
pub fn lookup_target(request: &Request) -> Option<String> {
    let ir = request.ir.as_ref()?;
    match any_to_json(ir.args.get(TARGET_ARG)?)? {
        serde_json::Value::String(service) => Some(service),
        _ => None,
    }
}

#[async_trait]
impl CoordinatorLookup for RpcCoordinator {
    async fn lookup(&self, coordinator: &ServiceInfo, service: &str) -> Result<ServiceInfo, GatewayError> {
        let conn = self
            .pool
            .acquire(&coordinator.host, &coordinator.port, &self.tls)
            .await?;

        let mut request = lookup_request(&self.name, service)?;
        if let Some(gate) = &self.gate {
            gate.stamp(&mut request);
        }
        let mut client = ReverseClient::new(conn.channel().clone());
        let response = client
            .do_call(tonic::Request::new(request))
            .await
            .map_err(|status| {
                conn.observe(&status);
                GatewayError::unavailable(service, format!("coordinator call failed: {}", status.message()))
            })?
            .into_inner();

        parse_lookup_reply(service, &response.data)
    }
}

/// Turn the coordinator's reply data into a location.
///
/// `port` may be a string or a number; `isinternal` a bool, number or
/// string. A reply carrying `httpcode` is the coordinator reporting an error.
pub fn parse_lookup_reply(service: &str, data: &HashMap<String, Any>) -> Result<ServiceInfo, GatewayError> {
    let field = |key: &str| data.get(key).and_then(any_to_json);

    if let Some(code) = field("httpcode") {
        let message = field("message")
            .and_then(|m| m.as_str().map(str::to_string))
            .unwrap_or_default();
        return Err(GatewayError::unavailable(
            service,
            format!("coordinator answered {code}: {message}"),
        ));
    }

    let host = field("host")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let port = match field("port") {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if host.is_empty() || port.is_empty() {
        return Err(GatewayError::unavailable(service, "coordinator returned an empty host or port"));
    }

    let internal = match field("isinternal") {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(serde_json::Value::String(s)) => s == "true" || s == "1",
        _ => false,
    };

    Ok(ServiceInfo::new(host, port, internal))
}

//! Shared utilities for integration tests: an in-process `Reverse` backend
//! and a gateway bound to an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tonic::codegen::{http, Body, BoxFuture, Context, Poll, Service, StdError};
use tonic::server::{Grpc, NamedService, StreamingService, UnaryService};
use tonic::{Status, Streaming};
use tonic_prost::ProstCodec;

use api_gateway::config::{GatewayConfig, ServiceConfig};
use api_gateway::proto::{decode_map, json_to_any, Request, Response};
use api_gateway::registry::coordinator::lookup_target;
use api_gateway::{HttpServer, Shutdown};

/// What the mock backend saw and how it answers.
#[derive(Default)]
pub struct MockState {
    /// Every unary request, in arrival order.
    pub calls: Mutex<Vec<Request>>,
    /// Every streamed request message, in arrival order.
    pub streamed: Mutex<Vec<Request>>,
    /// Coordinator answers: service → (host, port).
    pub locations: Mutex<HashMap<String, (String, String)>>,
    /// Data returned for `checksession`.
    pub session: Mutex<Option<Value>>,
}

impl MockState {
    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn streamed(&self) -> Vec<Request> {
        self.streamed.lock().unwrap().clone()
    }

    pub fn set_location(&self, service: &str, addr: SocketAddr) {
        self.locations
            .lock()
            .unwrap()
            .insert(service.to_string(), (addr.ip().to_string(), addr.port().to_string()));
    }

    pub fn set_session(&self, data: Value) {
        *self.session.lock().unwrap() = Some(data);
    }

    fn answer(&self, request: Request) -> Result<Response, Status> {
        self.calls.lock().unwrap().push(request.clone());

        let selector = request.ir.as_ref().and_then(|ir| ir.param.clone());
        let data = match selector.as_deref() {
            Some("getmicroservicebypath") => {
                let module = lookup_target(&request).unwrap_or_default();
                match self.locations.lock().unwrap().get(&module) {
                    Some((host, port)) => json!({"host": host, "port": port}),
                    None => json!({"httpcode": 404, "message": "unknown module"}),
                }
            }
            Some("heartbeat") => {
                let args = decode_map(&request.args);
                if args.contains_key("fail") {
                    json!({"httpcode": 503, "message": "not leader"})
                } else {
                    json!({"leader": false, "epoch": 3, "seen_ts": args.get("ts")})
                }
            }
            Some("checksession") => self
                .session
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| json!({"httpcode": 401})),
            _ => {
                let args = decode_map(&request.args);
                if args.contains_key("fail") {
                    return Err(Status::internal("backend exploded"));
                }
                let mut data = json!({
                    "module": request.module,
                    "param": request.param,
                    "method": request.method,
                    "sign": request.sign,
                    "uid": request.uid,
                    "args": args,
                });
                if let Some(code) = args.get("httpcode") {
                    data["httpcode"] = code.clone();
                }
                data
            }
        };

        Ok(Response {
            data: to_any_map(&data),
            request_back: None,
        })
    }
}

fn to_any_map(value: &Value) -> HashMap<String, prost_types::Any> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v).unwrap()))
                .collect()
        })
        .unwrap_or_default()
}

/// Hand-rolled `Reverse` service around [`MockState`].
#[derive(Clone)]
struct ReverseServer {
    state: Arc<MockState>,
}

impl NamedService for ReverseServer {
    const NAME: &'static str = "Reverse";
}

struct DoSvc(Arc<MockState>);

impl UnaryService<Request> for DoSvc {
    type Response = Response;
    type Future = BoxFuture<tonic::Response<Response>, Status>;

    fn call(&mut self, request: tonic::Request<Request>) -> Self::Future {
        let state = self.0.clone();
        Box::pin(async move { state.answer(request.into_inner()).map(tonic::Response::new) })
    }
}

struct StreamSvc(Arc<MockState>);

type AckStream = tokio_stream::Iter<std::vec::IntoIter<Result<Response, Status>>>;

impl StreamingService<Request> for StreamSvc {
    type Response = Response;
    type ResponseStream = AckStream;
    type Future = BoxFuture<tonic::Response<AckStream>, Status>;

    fn call(&mut self, request: tonic::Request<Streaming<Request>>) -> Self::Future {
        let state = self.0.clone();
        Box::pin(async move {
            let mut inbound = request.into_inner();
            let mut received = 0u64;
            while let Some(message) = inbound.next().await {
                state.streamed.lock().unwrap().push(message?);
                received += 1;
            }
            let ack = Response {
                data: to_any_map(&json!({"received": received})),
                request_back: None,
            };
            Ok(tonic::Response::new(tokio_stream::iter(vec![Ok(ack)])))
        })
    }
}

impl<B> Service<http::Request<B>> for ReverseServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let state = self.state.clone();
        match request.uri().path() {
            "/Reverse/Do" => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::<Response, Request>::default());
                Ok(grpc.unary(DoSvc(state), request).await)
            }),
            "/Reverse/Stream" => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::<Response, Request>::default());
                Ok(grpc.streaming(StreamSvc(state), request).await)
            }),
            _ => Box::pin(async move {
                let mut response = http::Response::new(tonic::body::Body::default());
                let headers = response.headers_mut();
                headers.insert(Status::GRPC_STATUS, (tonic::Code::Unimplemented as i32).into());
                headers.insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
                Ok(response)
            }),
        }
    }
}

/// A running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState::default());
        let server = ReverseServer {
            state: state.clone(),
        };

        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(server)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });

        Self { addr, state }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port().to_string(),
            ..Default::default()
        }
    }
}

/// Static-mode config with `services` pointing at `backend`, guarded by a
/// static sign.
pub fn config_for(backend: &MockBackend, services: &[&str]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    for service in services {
        config
            .services
            .insert(service.to_string(), backend.service_config());
    }
    config.security.mode = Some("sign".into());
    config.security.sign = Some(SIGN.into());
    config.retries.max_attempts = 1;
    config
}

pub const SIGN: &str = "s3cret";

/// A gateway serving plain HTTP on an ephemeral port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    _updates: mpsc::UnboundedSender<GatewayConfig>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> RunningGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let (updates, update_rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(config);
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, update_rx, shutdown_rx).await.unwrap();
    });

    RunningGateway {
        addr,
        shutdown,
        _updates: updates,
    }
}

//! Client stub for the `Reverse` service.

use tokio_stream::Stream;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{GrpcMethod, Status, Streaming};
use tonic_prost::ProstCodec;

use super::{Request, Response, SERVICE_NAME};

const DO_PATH: &str = "/Reverse/Do";
const STREAM_PATH: &str = "/Reverse/Stream";

/// Thin typed wrapper over a pooled channel.
#[derive(Debug, Clone)]
pub struct ReverseClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ReverseClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("channel not ready: {e}")))
    }

    /// `rpc Do(Request) returns (Response)`.
    pub async fn do_call(
        &mut self,
        mut request: tonic::Request<Request>,
    ) -> Result<tonic::Response<Response>, Status> {
        self.ready().await?;
        request
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "Do"));
        let codec: ProstCodec<Request, Response> = ProstCodec::default();
        self.inner
            .unary(request, PathAndQuery::from_static(DO_PATH), codec)
            .await
    }

    /// `rpc Stream(stream Request) returns (stream Response)`.
    pub async fn stream<S>(
        &mut self,
        mut request: tonic::Request<S>,
    ) -> Result<tonic::Response<Streaming<Response>>, Status>
    where
        S: Stream<Item = Request> + Send + 'static,
    {
        self.ready().await?;
        request
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, "Stream"));
        let codec: ProstCodec<Request, Response> = ProstCodec::default();
        self.inner
            .streaming(request, PathAndQuery::from_static(STREAM_PATH), codec)
            .await
    }
}

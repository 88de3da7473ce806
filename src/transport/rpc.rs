//! Pooled gRPC implementation of [`Transport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::pool::{ConnectionPool, GrpcDialer, PooledChannel, TlsSettings};
use crate::proto::{Request, Response, ReverseClient};
use crate::registry::Registry;
use crate::resilience::{call_with_retry, effective_deadline, with_deadline, RetryPolicy};
use crate::transport::upload::{UploadEncoder, UploadSource, UploadSummary, DEFAULT_CHUNK_SIZE};
use crate::transport::{CallContext, Transport};

/// Messages buffered between the upload producer and the gRPC stream.
const UPLOAD_BUFFER: usize = 16;

/// Timeouts applied when a service has no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub unary: Duration,
    pub stream: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            unary: Duration::from_secs(5),
            stream: Duration::from_secs(120),
        }
    }
}

/// Registry + pool + retry + deadline, composed into one call.
pub struct RpcTransport {
    registry: Arc<Registry>,
    pool: Arc<ConnectionPool<GrpcDialer>>,
    tls: TlsSettings,
    retry: RetryPolicy,
    timeouts: CallTimeouts,
    chunk_size: usize,
}

impl RpcTransport {
    pub fn new(
        registry: Arc<Registry>,
        pool: Arc<ConnectionPool<GrpcDialer>>,
        tls: TlsSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            pool,
            tls,
            retry,
            timeouts: CallTimeouts::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<GrpcDialer>> {
        &self.pool
    }

    /// Unary timeout for `service`: its own setting or the default.
    pub fn call_timeout(&self, service: &str) -> Duration {
        self.registry
            .table()
            .get(service)
            .and_then(|entry| entry.timeout)
            .unwrap_or(self.timeouts.unary)
    }

    /// Stream timeout for `service`: its own setting or the default.
    pub fn stream_timeout(&self, service: &str) -> Duration {
        self.registry
            .table()
            .get(service)
            .and_then(|entry| entry.stream_timeout)
            .unwrap_or(self.timeouts.stream)
    }

    async fn connect(&self, service: &str) -> Result<PooledChannel<tonic::transport::Channel>, GatewayError> {
        let info = self.registry.resolve(service).await?;
        self.pool.acquire(&info.host, &info.port, &self.tls).await
    }
}

fn status_error(service: &str, status: &tonic::Status, after: Duration) -> GatewayError {
    if status.code() == tonic::Code::DeadlineExceeded {
        return GatewayError::Timeout {
            service: service.to_string(),
            after,
        };
    }
    GatewayError::call(service, status)
}

#[async_trait]
impl Transport for RpcTransport {
    async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        http_method: &str,
        request: &Request,
    ) -> Result<Response, GatewayError> {
        let span = tracing::info_span!(
            "backend_call",
            request_id = %ctx.request_id,
            service,
            method = http_method,
        );

        async move {
            let conn = self.connect(service).await?;
            let deadline = effective_deadline(self.call_timeout(service), ctx.deadline);
            let started = Instant::now();

            let mut outbound = request.clone();
            if outbound.method.is_none() {
                outbound.method = Some(http_method.to_string());
            }
            let client = ReverseClient::new(conn.channel().clone());

            let attempts = call_with_retry(&self.retry, "Reverse/Do", || {
                let mut client = client.clone();
                let mut call = tonic::Request::new(outbound.clone());
                call.set_timeout(deadline.saturating_duration_since(Instant::now()));
                async move { client.do_call(call).await }
            });
            let result = with_deadline(service, deadline, async {
                attempts.await.map_err(|status| {
                    conn.observe(&status);
                    tracing::error!(
                        addr = %conn.addr(),
                        code = ?status.code(),
                        message = %status.message(),
                        "backend call failed"
                    );
                    status_error(service, &status, started.elapsed())
                })
            })
            .await?;

            tracing::debug!(
                addr = %conn.addr(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "backend call completed"
            );
            Ok(result.into_inner())
        }
        .instrument(span)
        .await
    }

    async fn upload(
        &self,
        ctx: &CallContext,
        service: &str,
        template: &Request,
        source: UploadSource,
    ) -> Result<UploadSummary, GatewayError> {
        let span = tracing::info_span!("backend_upload", request_id = %ctx.request_id, service);

        async move {
            let conn = self.connect(service).await?;
            let deadline = effective_deadline(self.stream_timeout(service), ctx.deadline);

            let (tx, rx) = mpsc::channel(UPLOAD_BUFFER);
            let encoder = UploadEncoder::new(template, tx, self.chunk_size);
            let producer = async move {
                let sent = encoder.send_source(source).await;
                // Dropping the sender closes the request stream.
                drop(encoder);
                sent
            };

            let mut client = ReverseClient::new(conn.channel().clone());
            let consumer = async {
                let response = client
                    .stream(tonic::Request::new(ReceiverStream::new(rx)))
                    .await
                    .map_err(|status| {
                        conn.observe(&status);
                        tracing::error!(addr = %conn.addr(), code = ?status.code(), "opening upload stream failed");
                        GatewayError::Protocol(format!("opening stream: {}", status.message()))
                    })?;

                let mut inbound = response.into_inner();
                let mut responses = 0;
                loop {
                    match inbound.message().await {
                        Ok(Some(_)) => responses += 1,
                        Ok(None) => break,
                        Err(status) => {
                            conn.observe(&status);
                            tracing::error!(addr = %conn.addr(), code = ?status.code(), "upload stream broke");
                            return Err(GatewayError::Protocol(format!(
                                "receiving: {}",
                                status.message()
                            )));
                        }
                    }
                }
                Ok(responses)
            };

            let ((files, bytes), responses) =
                with_deadline(service, deadline, async { tokio::try_join!(producer, consumer) })
                    .await?;

            metrics::record_upload(files, bytes);
            tracing::info!(addr = %conn.addr(), files, bytes, responses, "upload completed");
            Ok(UploadSummary {
                files,
                bytes,
                responses,
            })
        }
        .instrument(span)
        .await
    }
}

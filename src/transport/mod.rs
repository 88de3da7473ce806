//! Transport: the single call surface of the HTTP layer.
//!
//! # Data Flow
//! ```text
//! Dispatcher::call(ctx, service, method, &mut request)
//!     → Transport::call (rpc.rs)
//!         → Registry::resolve(service)
//!         → ConnectionPool::acquire(host, port, tls)
//!         → Reverse/Do under retry policy, bounded by deadline
//!     → copy session fields from response.request_back onto request
//!
//! Dispatcher::upload(ctx, service, &template, source)
//!     → Transport::upload (rpc.rs + upload.rs)
//!         → same resolve/acquire
//!         → Reverse/Stream fed by an mpsc channel, drained until closed
//! ```
//!
//! # Design Decisions
//! - `Transport` is a trait so the HTTP layer and tests can swap the backend
//! - Every failure is a `GatewayError` with an HTTP status attached

pub mod dispatcher;
pub mod rpc;
pub mod upload;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::proto::{Request, Response};

pub use dispatcher::{propagate_session, Dispatcher};
pub use rpc::RpcTransport;
pub use upload::{UploadSource, UploadSummary};

/// Per-request call metadata.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Correlates gateway logs with the inbound HTTP request.
    pub request_id: String,
    /// Hard upper bound set by the caller, if any.
    pub deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Something that can carry a request envelope to a backend service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One unary call.
    async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        http_method: &str,
        request: &Request,
    ) -> Result<Response, GatewayError>;

    /// One streaming upload.
    async fn upload(
        &self,
        ctx: &CallContext,
        service: &str,
        template: &Request,
        source: UploadSource,
    ) -> Result<UploadSummary, GatewayError>;
}

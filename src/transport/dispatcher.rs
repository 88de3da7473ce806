//! Session-aware front of the transport.

use std::sync::Arc;

use crate::error::GatewayError;
use crate::proto::{Request, Response};
use crate::transport::{CallContext, Transport, UploadSource, UploadSummary};

/// Calls through any [`Transport`] and carries session updates back.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// One unary call. On success the backend's session view is copied onto
    /// `request` so later calls in the same HTTP request see it.
    pub async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        http_method: &str,
        request: &mut Request,
    ) -> Result<Response, GatewayError> {
        let response = self
            .transport
            .call(ctx, service, http_method, request)
            .await?;
        if let Some(echo) = &response.request_back {
            propagate_session(request, echo);
        }
        Ok(response)
    }

    pub async fn upload(
        &self,
        ctx: &CallContext,
        service: &str,
        template: &Request,
        source: UploadSource,
    ) -> Result<UploadSummary, GatewayError> {
        self.transport.upload(ctx, service, template, source).await
    }
}

/// Copy session fields present on `echo` onto `target`.
pub fn propagate_session(target: &mut Request, echo: &Request) {
    fn copy<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
        if let Some(value) = source {
            *target = Some(value.clone());
        }
    }

    copy(&mut target.token, &echo.token);
    copy(&mut target.token_type, &echo.token_type);
    copy(&mut target.language, &echo.language);
    copy(&mut target.uid, &echo.uid);
    copy(&mut target.is_admin, &echo.is_admin);
    copy(&mut target.session_end, &echo.session_end);
    copy(&mut target.completed, &echo.completed);
    copy(&mut target.readonly, &echo.readonly);
}

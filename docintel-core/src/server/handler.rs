use super::types::{Request, Response};
use crate::context::{AppContext, ServiceError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes requests to the application context.
pub struct RequestHandler {
    context: Arc<AppContext>,
}

impl RequestHandler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Routes request to appropriate handler based on type.
    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Classify(request) => self
                .context
                .classify(&request)
                .await
                .map(Response::Classification),
            Request::Answer(request) => self
                .context
                .answer(&request)
                .await
                .map(Response::Answer),
            Request::Status => Ok(Response::Status(self.context.status())),
        };

        result.unwrap_or_else(|e| {
            match &e {
                ServiceError::Internal(message) => warn!("Request failed: {}", message),
                other => debug!("Request rejected: {}", other),
            }
            Response::from(e)
        })
    }

    /// Parses one request line and handles it.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::from(ServiceError::Validation(format!("Malformed request: {}", e))),
        }
    }
}

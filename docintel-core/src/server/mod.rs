//! Unix socket server for classification and question answering.
//!
//! The server is organized into separate concerns:
//! - `types`: Protocol types for requests and responses
//! - `handler`: Routing requests to the application context
//! - `transport`: Unix socket communication layer
//!
//! Each connection carries newline-delimited JSON: one request per line, one
//! response line per request, in order.

mod handler;
mod transport;
mod types;

pub use handler::RequestHandler;
pub use transport::{Client, Frame, TransportError, UnixSocketTransport, MAX_LINE_BYTES};
pub use types::{ErrorBody, Request, Response};

use crate::context::{AppContext, ServiceError};
use std::future::Future;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tracing::{debug, info, warn};

/// Main server coordinating transport and request handling.
pub struct Server {
    handler: Arc<RequestHandler>,
    transport: UnixSocketTransport,
}

impl Server {
    pub fn new(socket_path: impl Into<String>, context: Arc<AppContext>) -> Self {
        let handler = Arc::new(RequestHandler::new(context));
        let transport = UnixSocketTransport::new(socket_path);
        Self { handler, transport }
    }

    /// Serves until Ctrl-C.
    pub async fn start(&self) -> transport::Result<()> {
        self.run_until(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serves until `shutdown` completes, then removes the socket file.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> transport::Result<()> {
        let listener = self.transport.bind().await?;
        info!("Server listening on {}", self.transport.socket_path());

        serve(listener, Arc::clone(&self.handler), shutdown).await;

        info!("Shutting down");
        self.transport.cleanup();
        Ok(())
    }
}

async fn serve<F: Future<Output = ()>>(
    listener: UnixListener,
    handler: Arc<RequestHandler>,
    shutdown: F,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            _ = &mut shutdown => break,
        }
    }
}

/// Handles a single client connection.
async fn handle_connection(
    stream: UnixStream,
    handler: Arc<RequestHandler>,
) -> transport::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(frame) = transport::read_frame(&mut reader, MAX_LINE_BYTES).await? {
        let response = match frame {
            Frame::Line(line) => handler.handle_line(&line).await,
            Frame::Invalid(reason) => Response::from(ServiceError::Validation(reason)),
            Frame::Oversized => {
                let error = ServiceError::Validation(format!(
                    "Request exceeds {} bytes",
                    MAX_LINE_BYTES
                ));
                transport::write_json(&mut writer, &Response::from(error)).await?;
                warn!("Closing connection after an oversized request");
                return Ok(());
            }
        };
        transport::write_json(&mut writer, &response).await?;
    }

    debug!("Client disconnected");
    Ok(())
}

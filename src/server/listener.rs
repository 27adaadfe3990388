//! HTTP server listener
//!
//! Binds the TCP listener and serves [`BrokerHandler`] through axum.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use http::StatusCode;
use tokio::net::TcpListener;

use crate::broker::Broker;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::handler::BrokerHandler;

/// Frame broker HTTP server
pub struct BrokerServer {
    config: ServerConfig,
    handler: Arc<BrokerHandler>,
}

impl BrokerServer {
    /// Create a new server serving `broker`
    pub fn new(config: ServerConfig, broker: Arc<Broker>) -> Self {
        let handler = Arc::new(BrokerHandler::new(broker, config.clone()));
        Self { config, handler }
    }

    /// Get a reference to the broker
    pub fn broker(&self) -> &Arc<Broker> {
        self.handler.broker()
    }

    /// Router with every request going to the broker handler
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(serve)
            .with_state(Arc::clone(&self.handler))
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, base_path = %self.config.base_path, "Frame broker listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

/// Buffer the body and hand the request to the broker handler.
///
/// Broker calls can block (removing a channel joins its pipeline), so they run
/// on the blocking pool.
async fn serve(State(handler): State<Arc<BrokerHandler>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let limit = handler.config().max_body_size;

    let body = match axum::body::to_bytes(body, limit).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, path = %parts.uri.path(), "Rejected request body");
            return status_only(StatusCode::PAYLOAD_TOO_LARGE);
        }
    };

    let request = http::Request::from_parts(parts, body);
    match tokio::task::spawn_blocking(move || handler.handle(request)).await {
        Ok(response) => response.map(Body::from),
        Err(e) => {
            tracing::error!(error = %e, "Request handler panicked");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status_only(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

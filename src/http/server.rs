//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Compile the configured route table into a pipeline
//! - Serve the current pipeline behind an axum fallback
//! - Wire up the trace layer and connection info
//! - Swap in recompiled pipelines on config reload
//! - Stop accepting on shutdown and drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::http::dispatch::RouteHandler;
use crate::http::middleware::Middleware;
use crate::http::pipeline::Pipeline;
use crate::routing::error::RouteError;
use crate::routing::table::{self, TableOptions};

/// Compile `config` into a servable pipeline.
pub fn build_pipeline(config: &AppConfig) -> Result<Pipeline, RouteError> {
    let options = TableOptions {
        answer_options: config.routing.answer_options,
    };
    let driver = match table::compile(&config.routes, &options)? {
        Some(root) => RouteHandler::new(root),
        None => {
            tracing::warn!("Route table is empty, every request will be a 404");
            RouteHandler::empty()
        }
    }
    .with_max_depth(config.routing.max_depth)
    .with_diagnostics(config.routing.diagnostics);

    let mut middleware = Vec::new();
    if config.observability.request_id {
        middleware.push(Middleware::request_id());
    }
    Ok(Pipeline::new(driver.into_handler(), middleware))
}

/// HTTP server for the router.
pub struct HttpServer {
    config: AppConfig,
    current: Arc<ArcSwap<Pipeline>>,
}

impl HttpServer {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            current: Arc::new(ArcSwap::from_pointee(pipeline)),
        }
    }

    /// Compile the route table from `config` and wrap it in a server.
    pub fn from_config(config: AppConfig) -> Result<Self, RouteError> {
        let pipeline = build_pipeline(&config)?;
        Ok(Self::new(config, pipeline))
    }

    /// Publish a new pipeline; requests already in flight finish on the old one.
    pub fn replace(&self, pipeline: Pipeline) {
        self.current.store(Arc::new(pipeline));
    }

    /// Build the Axum router. Every request goes to whichever pipeline is
    /// current when it arrives.
    pub fn router(&self) -> Router {
        let current = self.current.clone();
        Router::new()
            .fallback(move |req: Request<Body>| {
                let pipeline = current.load_full();
                async move { pipeline.handler().handle(req).await }
            })
            .layer(TraceLayer::new_for_http())
    }

    /// Recompile and publish every config received on `updates`. A config that
    /// fails to compile is logged and the current pipeline stays.
    pub fn apply_updates(&self, mut updates: mpsc::UnboundedReceiver<AppConfig>) -> JoinHandle<()> {
        let current = self.current.clone();
        let bind_address = self.config.listener.bind_address.clone();

        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                if config.listener.bind_address != bind_address {
                    tracing::warn!(
                        configured = %config.listener.bind_address,
                        active = %bind_address,
                        "Listener address changes need a restart"
                    );
                }
                match build_pipeline(&config) {
                    Ok(pipeline) => {
                        current.store(Arc::new(pipeline));
                        tracing::info!(routes = config.routes.len(), "Route table reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded routes rejected, keeping current table")
                    }
                }
            }
        })
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

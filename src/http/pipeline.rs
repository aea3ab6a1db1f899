//! Middleware composition around a base handler.
//!
//! # Design Decisions
//! - The first middleware listed is the outermost wrapper
//! - The composed handler is built on first use and cached
//! - Rebuilds publish a finished handler by swapping a pointer; readers never
//!   see a half-built chain

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwapOption;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::{BoxFuture, FutureExt};
use tower::Service;

use crate::http::handler::Handler;
use crate::http::middleware::Middleware;

/// Wrap `base` in `middleware`, first entry outermost.
pub fn compose(base: &Handler, middleware: &[Middleware]) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(base.clone(), |handler, mw| mw.apply(handler))
}

struct Inner {
    base: Handler,
    middleware: Vec<Middleware>,
    composed: ArcSwapOption<Handler>,
}

/// A base handler plus the middleware wrapped around it.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(base: Handler, middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self {
            inner: Arc::new(Inner {
                base,
                middleware: middleware.into_iter().collect(),
                composed: ArcSwapOption::empty(),
            }),
        }
    }

    /// The composed handler, building it on first use.
    pub fn handler(&self) -> Handler {
        if let Some(handler) = self.inner.composed.load_full() {
            return handler.as_ref().clone();
        }
        // Two first calls may both compose; either result is equivalent.
        self.rebuild()
    }

    /// Recompose and publish a fresh handler.
    pub fn rebuild(&self) -> Handler {
        let handler = compose(&self.inner.base, &self.inner.middleware);
        self.inner.composed.store(Some(Arc::new(handler.clone())));
        tracing::debug!(middleware = self.inner.middleware.len(), "Pipeline composed");
        handler
    }

    pub fn is_built(&self) -> bool {
        self.inner.composed.load().is_some()
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.inner.middleware
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.inner.middleware.len())
            .field("built", &self.is_built())
            .finish()
    }
}

impl Service<Request<Body>> for Pipeline {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.handler().handle(req).map(Ok).boxed()
    }
}

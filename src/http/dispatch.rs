//! Driver loop: walks a routing graph and runs the handler it ends on.
//!
//! # Data Flow
//! ```text
//! Request
//!     → split into head + body
//!     → Cursor over the head
//!     → Resolving: step.resolve(cursor)
//!         Continue(next)  → Resolving(next)
//!         Terminal(h)     → Terminated(h), or NotFound when path is left over
//!         NoMatch         → NotFound
//!         too many steps  → Errored(DepthExceeded)
//!     → Terminated: handler runs inside a per-request unwind guard
//!     → NotFound:   not-found hook
//!     → Errored / panic: recovery hook
//! ```
//!
//! # Design Decisions
//! - Resolution is synchronous and never touches the body
//! - Every request gets its own unwind guard; nothing is shared between guards
//! - The recovery hook is itself guarded and degrades to a bare 500

use std::convert::Infallible;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use tower::Service;

use crate::http::handler::{Handler, RequestInfo};
use crate::http::middleware::RequestId;
use crate::http::respond;
use crate::observability::metrics::{record_depth, record_outcome};
use crate::routing::error::{panic_message, RouteError};
use crate::routing::resolve::{Captures, Cursor, RemainingPath, Resolution, Resolve, Route};

/// Responder for faults raised while serving a request.
pub type RecoverHook = Arc<dyn Fn(&RouteError, &RequestInfo) -> Response + Send + Sync>;

/// Steps allowed before a request is treated as stuck in a cycle.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Where resolution ended for one request.
#[derive(Debug)]
pub enum Outcome {
    Terminated {
        handler: Handler,
        captures: Captures,
        remaining: RemainingPath,
        depth: usize,
    },
    NotFound {
        depth: usize,
    },
    Errored {
        error: RouteError,
        depth: usize,
    },
}

enum State {
    Resolving(Route),
    Terminated(Handler),
    NotFound,
    Errored(RouteError),
}

/// Serves requests by resolving them against a routing graph.
#[derive(Clone)]
pub struct RouteHandler {
    root: Option<Route>,
    not_found: Option<Handler>,
    recover: Option<RecoverHook>,
    max_depth: usize,
    diagnostics: bool,
}

impl RouteHandler {
    pub fn new(root: impl Into<Route>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::empty()
        }
    }

    /// A driver without a graph; every request is a Not-Found.
    pub fn empty() -> Self {
        Self {
            root: None,
            not_found: None,
            recover: None,
            max_depth: DEFAULT_MAX_DEPTH,
            diagnostics: true,
        }
    }

    /// Replace the default 404 responder.
    pub fn with_not_found(mut self, handler: Handler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Replace the default 500 responder.
    pub fn with_recover<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RouteError, &RequestInfo) -> Response + Send + Sync + 'static,
    {
        self.recover = Some(Arc::new(hook));
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Include the technical information block in default 404 and 500 bodies.
    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn root(&self) -> Option<&Route> {
        self.root.as_ref()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walk the graph for a request head without running anything.
    pub fn resolve(&self, parts: &Parts) -> Outcome {
        let Some(root) = &self.root else {
            return Outcome::NotFound { depth: 0 };
        };

        let mut cursor = Cursor::new(parts);
        let mut state = State::Resolving(root.clone());
        let mut depth = 0;

        loop {
            state = match state {
                State::Resolving(_) if depth >= self.max_depth => {
                    State::Errored(RouteError::DepthExceeded(self.max_depth))
                }
                State::Resolving(step) => {
                    depth += 1;
                    tracing::trace!(depth, step = ?step, "Resolving");
                    match step.resolve(&mut cursor) {
                        Resolution::Continue(next) => State::Resolving(next),
                        Resolution::Terminal(_) if cursor.has_unclaimed_path() => {
                            tracing::trace!(
                                remaining = %cursor.remaining_path(),
                                "Handler reached with unconsumed path"
                            );
                            State::NotFound
                        }
                        Resolution::Terminal(handler) => State::Terminated(handler),
                        Resolution::NoMatch => State::NotFound,
                    }
                }
                State::Terminated(handler) => {
                    let (captures, remaining) = cursor.into_extras();
                    return Outcome::Terminated {
                        handler,
                        captures,
                        remaining,
                        depth,
                    };
                }
                State::NotFound => return Outcome::NotFound { depth },
                State::Errored(error) => return Outcome::Errored { error, depth },
            };
        }
    }

    /// Resolve and serve one request. Always produces a response.
    ///
    /// On Not-Found the request reaching a custom not-found handler carries the
    /// [`RouteError::NoRouteMatched`] in its extensions.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let (mut parts, body) = req.into_parts();
        let request_id = request_id_of(&parts);

        match self.resolve(&parts) {
            Outcome::Terminated {
                handler,
                captures,
                remaining,
                depth,
            } => {
                record_depth(depth);
                tracing::debug!(
                    request_id = %request_id,
                    method = %parts.method,
                    path = %parts.uri.path(),
                    depth,
                    "Route matched"
                );

                parts.extensions.insert(captures);
                parts.extensions.insert(remaining);
                let info = RequestInfo::from_parts(&parts);

                match invoke(&handler, Request::from_parts(parts, body)).await {
                    Ok(res) => {
                        record_outcome("handled");
                        res
                    }
                    Err(fault) => {
                        tracing::error!(
                            request_id = %request_id,
                            method = %info.method,
                            path = %info.uri.path(),
                            error = %fault,
                            "Handler panicked"
                        );
                        record_outcome("fault");
                        self.recover(&fault, &info)
                    }
                }
            }
            Outcome::NotFound { depth } => {
                record_depth(depth);
                record_outcome("not_found");
                let error = RouteError::NoRouteMatched {
                    method: parts.method.to_string(),
                    path: parts.uri.path().to_string(),
                };
                tracing::warn!(request_id = %request_id, depth, error = %error, "No route matched");

                let info = RequestInfo::from_parts(&parts);
                match &self.not_found {
                    Some(handler) => {
                        parts.extensions.insert(error);
                        invoke(handler, Request::from_parts(parts, body))
                            .await
                            .unwrap_or_else(|fault| self.recover(&fault, &info))
                    }
                    None => respond::not_found(&info, self.diagnostics),
                }
            }
            Outcome::Errored { error, depth } => {
                record_depth(depth);
                record_outcome("error");
                tracing::error!(
                    request_id = %request_id,
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %error,
                    "Resolution failed"
                );
                self.recover(&error, &RequestInfo::from_parts(&parts))
            }
        }
    }

    fn recover(&self, error: &RouteError, info: &RequestInfo) -> Response {
        let Some(hook) = &self.recover else {
            return respond::internal_error(error, info, self.diagnostics);
        };

        match catch_unwind(AssertUnwindSafe(|| hook(error, info))) {
            Ok(res) => res,
            Err(payload) => {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "Recovery hook panicked"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Freeze into a [`Handler`] for use as a pipeline base.
    pub fn into_handler(self) -> Handler {
        let this = Arc::new(self);
        Handler::new(move |req| {
            let this = this.clone();
            async move { this.dispatch(req).await }
        })
    }
}

/// The request ID assigned by [`Middleware::request_id`](crate::http::Middleware::request_id),
/// or `-` when that middleware is not installed.
fn request_id_of(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Run a handler, turning a panic in either the call or its future into a fault.
async fn invoke(handler: &Handler, req: Request<Body>) -> Result<Response, RouteError> {
    let fut = catch_unwind(AssertUnwindSafe(|| handler.handle(req)))
        .map_err(|payload| RouteError::HandlerFault(panic_message(payload.as_ref())))?;

    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| RouteError::HandlerFault(panic_message(payload.as_ref())))
}

impl Default for RouteHandler {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("root", &self.root)
            .field("custom_not_found", &self.not_found.is_some())
            .field("custom_recover", &self.recover.is_some())
            .field("max_depth", &self.max_depth)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl Service<Request<Body>> for RouteHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let this = self.clone();
        async move { Ok(this.dispatch(req).await) }.boxed()
    }
}

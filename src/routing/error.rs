//! Routing error definitions.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced while building or walking a routing trie.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// Domain, path or verb resolution ran out of candidates.
    #[error("no route matched {method} {path}")]
    NoRouteMatched { method: String, path: String },

    /// A terminal handler panicked; carries the stringified panic payload.
    #[error("internal server error: {0}")]
    HandlerFault(String),

    /// A resolver was built with bindings that cannot be served.
    #[error("misconfigured {resolver}: {}", .problems.join(", "))]
    Misconfigured {
        resolver: &'static str,
        problems: Vec<String>,
    },

    /// Resolution did not terminate within the configured number of steps.
    #[error("resolution exceeded {0} steps, the routing graph is probably cyclic")]
    DepthExceeded(usize),
}

impl RouteError {
    pub(crate) fn misconfigured(resolver: &'static str, problems: Vec<String>) -> Self {
        Self::Misconfigured { resolver, problems }
    }

    /// HTTP status a client sees when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoRouteMatched { .. } => StatusCode::NOT_FOUND,
            Self::HandlerFault(_) | Self::Misconfigured { .. } | Self::DepthExceeded(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Render a panic payload the way `panic!` formatted it.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

//! Trie-based HTTP request router.
//!
//! Requests are resolved step by step through domain, path and method tries
//! until a terminal handler is reached, then served through a middleware
//! pipeline with per-request panic recovery.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::AppConfig;
pub use http::{Handler, HttpServer, Middleware, Pipeline, RouteHandler};
pub use lifecycle::Shutdown;
pub use routing::{DomainResolver, PathResolver, Resolution, Route, RouteError, VerbResolver};

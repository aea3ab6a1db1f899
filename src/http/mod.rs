//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, trace layer, connect info)
//!     → pipeline.rs (middleware, outer-first)
//!     → middleware.rs (request id, tower layers)
//!     → dispatch.rs (driver loop over the routing tries)
//!     → handler.rs (terminal handler) or respond.rs (404 / 405 / 500)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod handler;
pub mod middleware;
pub mod pipeline;
pub mod respond;
pub mod server;

pub use dispatch::RouteHandler;
pub use handler::{Handler, RequestInfo};
pub use middleware::{Middleware, RequestId, X_REQUEST_ID};
pub use pipeline::Pipeline;
pub use server::HttpServer;

//! Handler transforms composed by a [`Pipeline`](crate::http::pipeline::Pipeline).
//!
//! # Design Decisions
//! - A middleware is a plain `Handler → Handler` function
//! - Tower layers are adapted rather than re-implemented
//! - Request IDs are assigned as early as possible so every log line can carry one

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use tower::{BoxError, Layer, Service};
use uuid::Uuid;

use crate::http::handler::Handler;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request ID stored in the request extensions by [`Middleware::request_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub HeaderValue);

impl RequestId {
    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or("unknown")
    }
}

/// Wraps a handler to add behavior around it.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(Handler) -> Handler + Send + Sync>,
}

impl Middleware {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    pub fn apply(&self, handler: Handler) -> Handler {
        (self.wrap)(handler)
    }

    /// Adapt a tower layer, e.g. one of the `tower_http` header layers.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request<Body>> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request<Body>>>::Response: IntoResponse,
        <L::Service as Service<Request<Body>>>::Error: Into<BoxError>,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        Self::new(move |inner| Handler::from_service(layer.layer(inner)))
    }

    /// Rewrite every request before the wrapped handler sees it.
    pub fn map_request<F>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Request<Body> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |inner| {
            let f = f.clone();
            Handler::new(move |req| inner.handle(f(req)))
        })
    }

    /// Rewrite every response the wrapped handler produces.
    pub fn map_response<F>(f: F) -> Self
    where
        F: Fn(Response) -> Response + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |inner| {
            let f = f.clone();
            Handler::new(move |req| {
                let fut = inner.handle(req);
                let f = f.clone();
                async move { f(fut.await) }
            })
        })
    }

    /// Assign a UUID v4 `x-request-id` when the client sent none, expose it as
    /// a [`RequestId`] extension and echo it on the response.
    pub fn request_id() -> Self {
        Self::new(|inner| {
            Handler::new(move |mut req: Request<Body>| {
                let id = req.headers().get(&X_REQUEST_ID).cloned().or_else(|| {
                    HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()
                });
                if let Some(id) = &id {
                    req.headers_mut().insert(X_REQUEST_ID, id.clone());
                    req.extensions_mut().insert(RequestId(id.clone()));
                }

                let fut = inner.handle(req);
                async move {
                    let mut res = fut.await;
                    if let Some(id) = id {
                        res.headers_mut().insert(X_REQUEST_ID, id);
                    }
                    res
                }
            })
        })
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use tower_http::set_header::SetResponseHeaderLayer;

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    fn echo_request_id() -> Handler {
        Handler::new(|req: Request<Body>| async move {
            req.extensions()
                .get::<RequestId>()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default()
        })
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_echoed() {
        let handler = Middleware::request_id().apply(echo_request_id());
        let res = handler.handle(request()).await;

        let echoed = res.headers()[&X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&echoed).is_ok());

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, echoed.as_bytes());
    }

    #[tokio::test]
    async fn test_request_id_is_preserved() {
        let handler = Middleware::request_id().apply(echo_request_id());
        let req = Request::builder()
            .uri("/")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let res = handler.handle(req).await;
        assert_eq!(res.headers()[&X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_from_layer() {
        let layer = SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        );
        let handler = Middleware::from_layer(layer).apply(Handler::text(StatusCode::OK, "x"));
        let res = handler.handle(request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn test_map_request_and_response() {
        let path_echo = Handler::new(|req: Request<Body>| async move { req.uri().path().to_string() });

        let rewrite = Middleware::map_request(|mut req| {
            *req.uri_mut() = "/rewritten".parse().unwrap();
            req
        });
        let teapot = Middleware::map_response(|mut res| {
            *res.status_mut() = StatusCode::IM_A_TEAPOT;
            res
        });

        let handler = teapot.apply(rewrite.apply(path_echo));
        let res = handler.handle(request()).await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"/rewritten");
    }
}

//! Terminal handlers and request snapshots.
//!
//! # Responsibilities
//! - Type-erase async request handlers behind a cheap, cloneable value
//! - Adapt arbitrary tower services into handlers (and back)
//! - Capture the request head for diagnostics after the body is consumed
//!
//! # Design Decisions
//! - Handlers always produce a `Response`; failures are responses, not errors
//! - A handler is shared by `Arc`, so trie nodes clone it freely

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, Method, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use tower::{BoxError, Service, ServiceExt};

/// Future returned by every [`Handler`].
pub type HandlerFuture = BoxFuture<'static, Response>;

/// A request-processing function that ends route resolution.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<dyn Fn(Request<Body>) -> HandlerFuture + Send + Sync>,
}

impl Handler {
    /// Wrap an async function.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        Self {
            inner: Arc::new(move |req| {
                let fut = f(req);
                async move { fut.await.into_response() }.boxed()
            }),
        }
    }

    /// Wrap a tower service. Service errors become a logged 500.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<Request<Body>> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        Self::new(move |req| {
            let service = service.clone();
            async move {
                match service.oneshot(req).await {
                    Ok(res) => res.into_response(),
                    Err(err) => {
                        let err: BoxError = err.into();
                        tracing::error!(error = %err, "Wrapped service failed");
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
        })
    }

    /// A handler that answers every request with the same status and text body.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let body: Arc<str> = Arc::from(body.into());
        Self::new(move |_req| {
            let body = body.clone();
            async move {
                (
                    status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    body.to_string(),
                )
            }
        })
    }

    /// Start handling a request.
    pub fn handle(&self, req: Request<Body>) -> HandlerFuture {
        (self.inner)(req)
    }

    /// True when both values share the same underlying function.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl Service<Request<Body>> for Handler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.handle(req).map(Ok).boxed()
    }
}

/// Host a request was addressed to: the `Host` header, else the URI authority.
pub fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("")
}

/// Snapshot of a request head, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub host: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn from_parts(parts: &Parts) -> Self {
        Self::build(
            &parts.method,
            &parts.uri,
            parts.version,
            &parts.headers,
            &parts.extensions,
        )
    }

    pub fn of<B>(req: &Request<B>) -> Self {
        Self::build(
            req.method(),
            req.uri(),
            req.version(),
            req.headers(),
            req.extensions(),
        )
    }

    fn build(
        method: &Method,
        uri: &Uri,
        version: Version,
        headers: &HeaderMap,
        extensions: &Extensions,
    ) -> Self {
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Self {
            method: method.clone(),
            uri: uri.clone(),
            host: request_host(headers, uri).to_string(),
            version,
            headers: headers.clone(),
            content_length,
            remote_addr: extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    /// Plain-text block describing the request, appended to diagnostic bodies.
    pub fn technical(&self) -> String {
        let content_length = self
            .content_length
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let remote = self
            .remote_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Technical Information:\n    \
             Request URI: {:?}\n    \
             Method: {:?}\n    \
             Protocol: {:?}\n    \
             Headers: {:?}\n    \
             ContentLength: {}\n    \
             Remote Address: {:?}",
            format!("{}{}", self.host, self.uri.path()),
            self.method.as_str(),
            self.version,
            self.headers,
            content_length,
            remote,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_handler_from_closure() {
        let handler = Handler::new(|req: Request<Body>| async move {
            format!("hello {}", req.uri().path())
        });

        let req = Request::builder().uri("/world").body(Body::empty()).unwrap();
        let res = handler.handle(req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "hello /world");
    }

    #[tokio::test]
    async fn test_handler_is_a_service() {
        let handler = Handler::text(StatusCode::ACCEPTED, "queued");
        let req = Request::builder().body(Body::empty()).unwrap();
        let res = handler.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(body_text(res).await, "queued");
    }

    #[tokio::test]
    async fn test_from_service_maps_errors_to_500() {
        let failing = tower::service_fn(|_req: Request<Body>| async {
            Err::<Response, BoxError>("backend gone".into())
        });
        let handler = Handler::from_service(failing);
        let req = Request::builder().body(Body::empty()).unwrap();
        let res = handler.handle(req).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_ptr_eq() {
        let a = Handler::text(StatusCode::OK, "a");
        let b = a.clone();
        let c = Handler::text(StatusCode::OK, "a");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn test_request_info_snapshot() {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("host", "files.example.com")
            .header("content-length", "42")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        let info = RequestInfo::of(&req);
        assert_eq!(info.method, Method::POST);
        assert_eq!(info.host, "files.example.com");
        assert_eq!(info.content_length, Some(42));
        assert_eq!(info.remote_addr, Some(addr));

        let text = info.technical();
        assert!(text.contains("\"files.example.com/upload\""));
        assert!(text.contains("Method: \"POST\""));
        assert!(text.contains("ContentLength: 42"));
        assert!(text.contains("10.0.0.7:5555"));
    }

    #[test]
    fn test_request_host_falls_back_to_authority() {
        let req = Request::builder()
            .uri("http://api.example.com:8080/v1")
            .body(())
            .unwrap();
        assert_eq!(request_host(req.headers(), req.uri()), "api.example.com:8080");
    }
}

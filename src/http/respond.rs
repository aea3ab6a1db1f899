//! Canned responses used by the routing hooks.
//!
//! # Design Decisions
//! - Diagnostic bodies are plain text; negotiation is left to middleware
//! - Technical details are opt-in so production deployments can hide them

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::handler::RequestInfo;
use crate::routing::error::RouteError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub fn plain(status: StatusCode, body: impl Into<String>) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body.into()).into_response()
}

/// `Allow` header value for a method list: `GET, POST`.
pub fn allow_value(methods: &[Method]) -> HeaderValue {
    let joined = methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Default 404 body.
pub fn not_found(info: &RequestInfo, diagnostics: bool) -> Response {
    let mut body = String::from("A resource could not be found to match your request.");
    if diagnostics {
        body.push('\n');
        body.push_str(&info.technical());
    }
    plain(StatusCode::NOT_FOUND, body)
}

/// Default body for errors raised while serving a request.
pub fn internal_error(error: &RouteError, info: &RequestInfo, diagnostics: bool) -> Response {
    let mut body =
        String::from("An Internal Server Error was encountered while handling your request");
    if diagnostics {
        body.push_str(&format!(":\n{:?}\n", error.to_string()));
        body.push_str(&info.technical());
    } else {
        body.push('.');
    }
    plain(error.status(), body)
}

/// Default OPTIONS answer.
pub fn options(methods: &[Method], _info: &RequestInfo) -> Response {
    (StatusCode::NO_CONTENT, [(header::ALLOW, allow_value(methods))]).into_response()
}

/// Default 405 answer.
pub fn method_not_allowed(methods: &[Method], _info: &RequestInfo) -> Response {
    let mut res = plain(
        StatusCode::METHOD_NOT_ALLOWED,
        format!(
            "Method Not Allowed. Allowed methods: {}",
            allow_value(methods).to_str().unwrap_or_default()
        ),
    );
    res.headers_mut().insert(header::ALLOW, allow_value(methods));
    res
}

/// Resolve a redirect target against the path it is issued from, the way a
/// browser resolves a relative `Location`.
pub fn resolve_location(request_path: &str, location: &str) -> String {
    if location.starts_with('/') || location.contains("://") {
        return location.to_string();
    }

    let (target, suffix) = match location.find(|c| c == '?' || c == '#') {
        Some(i) => location.split_at(i),
        None => (location, ""),
    };

    let base = match request_path.rfind('/') {
        Some(i) => &request_path[..=i],
        None => "/",
    };
    let joined = format!("{}{}", base, target);

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = format!("/{}", segments.join("/"));
    let keeps_slash = target.ends_with('/') || target.ends_with("/.") || target.ends_with("..");
    if keeps_slash && !out.ends_with('/') {
        out.push('/');
    }
    out.push_str(suffix);
    out
}

/// Redirect response with a short HTML body for non-HEAD requests.
pub fn redirect(status: StatusCode, request_path: &str, method: &Method, location: &str) -> Response {
    let target = resolve_location(request_path, location);
    let Ok(value) = HeaderValue::from_str(&target) else {
        tracing::error!(location = %target, "Redirect target is not a valid header value");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if method == Method::HEAD || method == Method::GET {
        let body = format!(
            "<a href=\"{}\">{}</a>.\n",
            target.replace('"', "&quot;"),
            status.canonical_reason().unwrap_or("Redirect")
        );
        (
            status,
            [
                (header::LOCATION, value),
                (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            ],
            if method == Method::HEAD { String::new() } else { body },
        )
            .into_response()
    } else {
        (status, [(header::LOCATION, value)]).into_response()
    }
}

/// Conditional GET against `If-Modified-Since`.
///
/// `headers` are the headers of the response being prepared. When the client
/// copy is current they become a bodiless 304, minus `Content-Type` and
/// `Content-Length`. Otherwise `Last-Modified` is stamped onto them and `None`
/// is returned so the caller serves the full body. A `last_modified` at or
/// before the Unix epoch means unknown and is never treated as current.
pub fn modified(
    request: &HeaderMap,
    headers: &mut HeaderMap,
    last_modified: SystemTime,
) -> Option<Response> {
    if last_modified <= UNIX_EPOCH {
        return None;
    }

    let since = request
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());

    // HTTP dates have whole-second precision.
    if let Some(since) = since {
        if last_modified < since + Duration::from_secs(1) {
            headers.remove(header::CONTENT_TYPE);
            headers.remove(header::CONTENT_LENGTH);
            return Some((StatusCode::NOT_MODIFIED, std::mem::take(headers)).into_response());
        }
    }

    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn info() -> RequestInfo {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/missing")
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap();
        RequestInfo::of(&req)
    }

    async fn text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_diagnostics_are_optional() {
        let res = not_found(&info(), true);
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        let body = text(res).await;
        assert!(body.contains("Technical Information"));
        assert!(body.contains("example.com/missing"));

        let body = text(not_found(&info(), false)).await;
        assert!(!body.contains("Technical Information"));
    }

    #[tokio::test]
    async fn test_internal_error_carries_fault() {
        let err = RouteError::HandlerFault("database on fire".into());
        let res = internal_error(&err, &info(), true);
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(res).await.contains("database on fire"));

        let res = internal_error(&err, &info(), false);
        assert!(!text(res).await.contains("database on fire"));
    }

    #[test]
    fn test_allow_value() {
        assert_eq!(allow_value(&[Method::GET, Method::POST]), "GET, POST");
        assert_eq!(allow_value(&[]), "");
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(resolve_location("/a/b", "/abs"), "/abs");
        assert_eq!(resolve_location("/a/b", "https://x.io/"), "https://x.io/");
        assert_eq!(resolve_location("/a/b", "c"), "/a/c");
        assert_eq!(resolve_location("/a/b/", "c"), "/a/b/c");
        assert_eq!(resolve_location("/a/b", "../c?x=1"), "/c?x=1");
        assert_eq!(resolve_location("/a/b", "./"), "/a/");
    }

    #[tokio::test]
    async fn test_redirect() {
        let res = redirect(StatusCode::FOUND, "/docs/old", &Method::GET, "new");
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "/docs/new");
        assert!(text(res).await.contains("href=\"/docs/new\""));

        let res = redirect(StatusCode::SEE_OTHER, "/form", &Method::POST, "/done");
        assert_eq!(res.headers()[header::LOCATION], "/done");
        assert!(res.headers().get(header::CONTENT_TYPE).is_none());
    }

    fn prepared() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        headers
    }

    fn since(date: &str) -> HeaderMap {
        let mut request = HeaderMap::new();
        request.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_str(date).unwrap());
        request
    }

    #[test]
    fn test_modified_answers_not_modified() {
        // Sub-second precision is lost on the wire.
        let changed = UNIX_EPOCH + Duration::from_millis(784_111_777_500);
        let mut headers = prepared();

        let res = modified(&since("Sun, 06 Nov 1994 08:49:37 GMT"), &mut headers, changed).unwrap();
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert!(res.headers().get(header::CONTENT_TYPE).is_none());
        assert!(res.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(res.headers()[header::CACHE_CONTROL], "max-age=60");
    }

    #[test]
    fn test_modified_stamps_last_modified() {
        let changed = UNIX_EPOCH + Duration::from_secs(784_111_800);
        let mut headers = prepared();

        assert!(modified(&since("Sun, 06 Nov 1994 08:49:37 GMT"), &mut headers, changed).is_none());
        assert_eq!(headers[header::LAST_MODIFIED], "Sun, 06 Nov 1994 08:50:00 GMT");
        assert_eq!(headers[header::CONTENT_TYPE], TEXT_PLAIN);

        // No or unparseable condition serves the full body.
        let mut headers = prepared();
        assert!(modified(&HeaderMap::new(), &mut headers, changed).is_none());
        assert!(modified(&since("yesterday"), &mut headers, changed).is_none());
        assert!(headers.contains_key(header::LAST_MODIFIED));
    }

    #[test]
    fn test_modified_unknown_time_is_never_current() {
        let mut headers = prepared();
        let res = modified(&since("Sun, 06 Nov 1994 08:49:37 GMT"), &mut headers, UNIX_EPOCH);
        assert!(res.is_none());
        assert!(!headers.contains_key(header::LAST_MODIFIED));
    }
}

//! Path trie resolution.
//!
//! # Responsibilities
//! - Consume URL path segments one hop at a time
//! - Bind whole multi-segment suffixes directly to a node
//! - Swallow one arbitrary segment through the `&` entry
//! - Mount a subtree that accepts everything below a prefix
//!
//! # Design Decisions
//! - Matching is case-sensitive and exact; no regex
//! - Duplicate slashes and `.`/`..` segments are cleaned before routing
//! - Extension stripping changes the comparison key only, never the remainder

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::routing::error::RouteError;
use crate::routing::resolve::{Cursor, Resolution, Resolve, Route};

/// Key of the entry used when the path is fully consumed.
pub const HERE: &str = "";

/// Key of the entry that swallows exactly one segment.
pub const WILDCARD: &str = "&";

/// Clean a request path: drop empty and `.` segments, apply `..`, and strip
/// leading and trailing slashes.
pub fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn collapse_slashes(path: &str) -> Cow<'_, str> {
    let trimmed = path.trim_matches('/');
    if trimmed.contains("//") {
        Cow::Owned(
            trimmed
                .split('/')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("/"),
        )
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Drop the extension of the last segment: `a/b.html` → `a/b`.
/// Dot-files keep their name.
pub fn strip_extension(path: &str) -> &str {
    let start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..start + dot],
        _ => path,
    }
}

/// Which precedence rule produced a [`PathMatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatchKind {
    Here,
    Whole,
    Segment,
    Mount,
    Wildcard(String),
}

/// A single hop through a [`PathResolver`].
#[derive(Debug, Clone)]
pub struct PathMatch<'a> {
    pub route: &'a Route,
    pub rest: String,
    pub kind: PathMatchKind,
}

/// Result of following path resolvers until something else is reached.
#[derive(Debug, Clone)]
pub struct PathDescent {
    pub route: Route,
    pub rest: String,
    pub captures: Vec<String>,
    pub released: bool,
}

/// A trie node keyed by URL path segments.
///
/// Path routing continues across nested resolvers from wherever the previous
/// one stopped, so `{"jo": {"b": h}}` serves `/jo/b`. A handler reached while
/// segments remain is only accepted when the last path step was a mount.
pub struct PathResolver {
    entries: HashMap<String, Route>,
    wildcard: Option<Route>,
    mounts: Vec<(String, Route)>,
    strip_extensions: bool,
}

impl PathResolver {
    pub fn builder() -> PathResolverBuilder {
        PathResolverBuilder::default()
    }

    /// Builder for a resolver that compares keys without file extensions.
    pub fn ignoring_extensions() -> PathResolverBuilder {
        PathResolverBuilder {
            strip_extensions: true,
            ..Default::default()
        }
    }

    fn key<'k>(&self, s: &'k str) -> &'k str {
        if self.strip_extensions {
            strip_extension(s)
        } else {
            s
        }
    }

    /// Take one hop for the unconsumed `path`.
    pub fn child(&self, path: &str) -> Option<PathMatch<'_>> {
        let path = path.trim_start_matches('/');
        let whole = collapse_slashes(path);

        if whole.is_empty() {
            return self.entries.get(HERE).map(|route| PathMatch {
                route,
                rest: String::new(),
                kind: PathMatchKind::Here,
            });
        }

        if let Some(route) = self.entries.get(self.key(&whole)) {
            return Some(PathMatch {
                route,
                rest: String::new(),
                kind: PathMatchKind::Whole,
            });
        }

        let (segment, rest) = match path.split_once('/') {
            Some((segment, rest)) => (segment, rest.trim_start_matches('/')),
            None => (path, ""),
        };

        if let Some(route) = self.entries.get(self.key(segment)) {
            return Some(PathMatch {
                route,
                rest: rest.to_string(),
                kind: PathMatchKind::Segment,
            });
        }

        for (prefix, route) in &self.mounts {
            let below = match whole.strip_prefix(prefix.as_str()) {
                Some("") => Some(""),
                Some(tail) => tail.strip_prefix('/'),
                None => None,
            };
            if let Some(tail) = below {
                return Some(PathMatch {
                    route,
                    rest: tail.to_string(),
                    kind: PathMatchKind::Mount,
                });
            }
        }

        self.wildcard.as_ref().map(|route| PathMatch {
            route,
            rest: rest.to_string(),
            kind: PathMatchKind::Wildcard(segment.to_string()),
        })
    }

    /// Follow nested path resolvers from `path` until a different kind of
    /// step, or a dead end, is reached.
    pub fn descend(&self, path: &str) -> Option<PathDescent> {
        let mut current = self;
        let mut path = path.to_string();
        let mut captures = Vec::new();

        loop {
            let hop = current.child(&path)?;
            let released = hop.kind == PathMatchKind::Mount;
            if let PathMatchKind::Wildcard(segment) = hop.kind {
                captures.push(segment);
            }
            path = hop.rest;

            match hop.route {
                Route::Path(next) if !released => current = next.as_ref(),
                route => {
                    return Some(PathDescent {
                        route: route.clone(),
                        rest: path,
                        captures,
                        released,
                    })
                }
            }
        }
    }

    /// Bound literal keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Resolve for PathResolver {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        let path = cursor.remaining_path().to_string();
        let Some(hop) = self.child(&path) else {
            tracing::trace!(path = %path, "No path entry matched");
            return Resolution::NoMatch;
        };

        tracing::trace!(path = %path, rest = %hop.rest, kind = ?hop.kind, "Path hop");
        match hop.kind {
            PathMatchKind::Mount => cursor.release_path(hop.rest),
            PathMatchKind::Wildcard(segment) => {
                cursor.capture(segment);
                cursor.advance_path(hop.rest);
            }
            _ => cursor.advance_path(hop.rest),
        }
        Resolution::Continue(hop.route.clone())
    }
}

impl fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mounts: Vec<&str> = self.mounts.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("PathResolver")
            .field("keys", &self.keys())
            .field("wildcard", &self.wildcard.is_some())
            .field("mounts", &mounts)
            .field("strip_extensions", &self.strip_extensions)
            .finish()
    }
}

/// Collects bindings; problems are reported together by [`build`](Self::build).
#[derive(Default)]
pub struct PathResolverBuilder {
    entries: HashMap<String, Route>,
    wildcard: Option<Route>,
    mounts: Vec<(String, Route)>,
    strip_extensions: bool,
    problems: Vec<String>,
}

impl PathResolverBuilder {
    /// Bind `route` to a segment, a multi-segment suffix, `""` or `&`.
    pub fn at(mut self, key: &str, route: impl Into<Route>) -> Self {
        let key = key.trim_matches('/');
        let route = route.into();

        if key == WILDCARD {
            if self.wildcard.replace(route).is_some() {
                self.problems.push("wildcard entry bound twice".to_string());
            }
            return self;
        }

        if !key.is_empty() {
            for segment in key.split('/') {
                if segment.is_empty() {
                    self.problems.push(format!("empty segment in path key {:?}", key));
                } else if segment == WILDCARD {
                    self.problems
                        .push(format!("wildcard inside multi-segment key {:?}", key));
                }
            }
        }

        if self.entries.insert(key.to_string(), route).is_some() {
            self.problems.push(format!("path key {:?} bound twice", key));
        }
        self
    }

    /// Bind the route used when the path ends here.
    pub fn here(self, route: impl Into<Route>) -> Self {
        self.at(HERE, route)
    }

    /// Bind the route that swallows one arbitrary segment.
    pub fn wildcard(self, route: impl Into<Route>) -> Self {
        self.at(WILDCARD, route)
    }

    /// Bind `route` to `prefix` and everything below it.
    pub fn mount(mut self, prefix: &str, route: impl Into<Route>) -> Self {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            self.problems.push("mount prefix must not be empty".to_string());
        } else if prefix.split('/').any(str::is_empty) {
            self.problems
                .push(format!("empty segment in mount prefix {:?}", prefix));
        } else if self.mounts.iter().any(|(p, _)| p == prefix) {
            self.problems.push(format!("mount {:?} bound twice", prefix));
        }
        self.mounts.push((prefix.to_string(), route.into()));
        self
    }

    pub fn build(mut self) -> Result<PathResolver, RouteError> {
        if !self.problems.is_empty() {
            return Err(RouteError::misconfigured("path resolver", self.problems));
        }
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(PathResolver {
            entries: self.entries,
            wildcard: self.wildcard,
            mounts: self.mounts,
            strip_extensions: self.strip_extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::Handler;
    use axum::http::StatusCode;

    fn handler(name: &'static str) -> Handler {
        Handler::text(StatusCode::OK, name)
    }

    fn is(route: &Route, expected: &Handler) -> bool {
        matches!(route, Route::Handler(h) if h.ptr_eq(expected))
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/a//b///c/"), "a/b/c");
        assert_eq!(normalize_path("/a/./b/../c"), "a/c");
        assert_eq!(normalize_path("/../../etc"), "etc");
    }

    #[test]
    fn test_empty_path_routes_here() {
        let home = handler("home");
        let p = PathResolver::builder().here(home.clone()).build().unwrap();

        for path in ["", "/", "///"] {
            let hop = p.child(path).unwrap();
            assert!(is(hop.route, &home));
            assert_eq!(hop.kind, PathMatchKind::Here);
            assert_eq!(hop.rest, "");
        }
    }

    #[test]
    fn test_whole_suffix_beats_segment() {
        let whole = handler("whole");
        let seg = handler("seg");
        let p = PathResolver::builder()
            .at("a/b/c", whole.clone())
            .at("a", seg.clone())
            .build()
            .unwrap();

        let hop = p.child("a/b/c").unwrap();
        assert!(is(hop.route, &whole));
        assert_eq!(hop.kind, PathMatchKind::Whole);

        let hop = p.child("a/b/d").unwrap();
        assert!(is(hop.route, &seg));
        assert_eq!(hop.rest, "b/d");
    }

    #[test]
    fn test_duplicate_slashes_match_like_single() {
        let whole = handler("whole");
        let seg = handler("seg");
        let p = PathResolver::builder()
            .at("x/y", whole.clone())
            .at("a", seg.clone())
            .build()
            .unwrap();

        assert!(is(p.child("x//y").unwrap().route, &whole));
        let hop = p.child("//a//b").unwrap();
        assert!(is(hop.route, &seg));
        assert_eq!(hop.rest, "b");
    }

    #[test]
    fn test_wildcard_swallows_one_segment() {
        let any = handler("any");
        let p = PathResolver::builder()
            .at("users", handler("users"))
            .wildcard(any.clone())
            .build()
            .unwrap();

        let hop = p.child("bob/images").unwrap();
        assert!(is(hop.route, &any));
        assert_eq!(hop.kind, PathMatchKind::Wildcard("bob".into()));
        assert_eq!(hop.rest, "images");

        // Literal entries win over the wildcard.
        assert_eq!(p.child("users").unwrap().kind, PathMatchKind::Whole);
    }

    #[test]
    fn test_no_match_returns_none() {
        let p = PathResolver::builder().at("a", handler("a")).build().unwrap();
        assert!(p.child("b").is_none());
        assert!(p.child("").is_none());
    }

    #[test]
    fn test_mount_takes_everything_below_prefix() {
        let assets = handler("assets");
        let p = PathResolver::builder()
            .mount("static", handler("static"))
            .mount("static/assets", assets.clone())
            .build()
            .unwrap();

        let hop = p.child("static/assets/css/site.css").unwrap();
        assert!(is(hop.route, &assets));
        assert_eq!(hop.kind, PathMatchKind::Mount);
        assert_eq!(hop.rest, "css/site.css");

        assert_eq!(p.child("static").unwrap().rest, "");
        // Prefixes only match on segment boundaries.
        assert!(p.child("staticky").is_none());
    }

    #[test]
    fn test_ignoring_extensions_compares_stems() {
        let anne = handler("anne");
        let p = PathResolver::ignoring_extensions()
            .at("anne", anne.clone())
            .build()
            .unwrap();

        let hop = p.child("anne.html").unwrap();
        assert!(is(hop.route, &anne));

        let hop = p.child("anne.d/images").unwrap();
        assert!(is(hop.route, &anne));
        assert_eq!(hop.rest, "images");
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("a/b.html"), "a/b");
        assert_eq!(strip_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(strip_extension(".hidden"), ".hidden");
        assert_eq!(strip_extension("dir.d/file"), "dir.d/file");
    }

    #[test]
    fn test_descend_through_nested_resolvers() {
        let b = handler("b");
        let inner = PathResolver::builder()
            .wildcard(PathResolver::builder().at("b", b.clone()).build().unwrap())
            .build()
            .unwrap();
        let root = PathResolver::builder().at("jo", inner).build().unwrap();

        let descent = root.descend("/jo/anne/b").unwrap();
        assert!(is(&descent.route, &b));
        assert_eq!(descent.rest, "");
        assert_eq!(descent.captures, vec!["anne".to_string()]);
        assert!(!descent.released);

        assert!(root.descend("/jo/anne/c").is_none());
    }

    #[test]
    fn test_builder_reports_every_problem() {
        let err = PathResolver::builder()
            .at("a//b", handler("x"))
            .at("a", handler("x"))
            .at("a", handler("y"))
            .at("x/&", handler("z"))
            .mount("", handler("m"))
            .build()
            .unwrap_err();

        match err {
            RouteError::Misconfigured { resolver, problems } => {
                assert_eq!(resolver, "path resolver");
                assert_eq!(problems.len(), 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

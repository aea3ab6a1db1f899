//! Resolution steps and the per-request cursor they advance.
//!
//! A routing graph is a tree of [`Route`] values. Each step looks at the part
//! of the request it is keyed on, advances the [`Cursor`] past what it
//! consumed and answers with a [`Resolution`]. The driver repeats this until a
//! handler or a dead end is reached.

use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};

use crate::http::handler::{request_host, Handler};
use crate::routing::domain::{normalize_host, DomainResolver};
use crate::routing::path::{normalize_path, PathResolver};
use crate::routing::verb::VerbResolver;

/// Outcome of a single resolution step.
#[derive(Debug)]
pub enum Resolution {
    /// Descend into another step; the cursor already reflects consumed input.
    Continue(Route),
    /// Stop descending and invoke this handler.
    Terminal(Handler),
    /// Nothing bound for the remaining input.
    NoMatch,
}

/// A resolution step implemented outside this crate.
pub trait Resolve: Send + Sync {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution;
}

/// One node of a routing graph.
#[derive(Clone)]
pub enum Route {
    Handler(Handler),
    Path(Arc<PathResolver>),
    Domain(Arc<DomainResolver>),
    Verb(Arc<VerbResolver>),
    Custom(Arc<dyn Resolve>),
}

impl Route {
    /// Terminal route backed by an async function.
    pub fn handle<F, Fut, R>(f: F) -> Self
    where
        F: Fn(axum::http::Request<axum::body::Body>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: axum::response::IntoResponse,
    {
        Self::Handler(Handler::new(f))
    }

    pub fn custom(resolver: impl Resolve + 'static) -> Self {
        Self::Custom(Arc::new(resolver))
    }

    /// Custom step backed by a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Cursor<'_>) -> Resolution + Send + Sync + 'static,
    {
        Self::custom(FnResolver(f))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Handler(_))
    }
}

impl Resolve for Route {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        match self {
            Self::Handler(handler) => Resolution::Terminal(handler.clone()),
            Self::Path(path) => path.resolve(cursor),
            Self::Domain(domain) => domain.resolve(cursor),
            Self::Verb(verb) => verb.resolve(cursor),
            Self::Custom(custom) => custom.resolve(cursor),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler"),
            Self::Path(path) => fmt::Debug::fmt(path, f),
            Self::Domain(domain) => fmt::Debug::fmt(domain, f),
            Self::Verb(verb) => fmt::Debug::fmt(verb, f),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl From<Handler> for Route {
    fn from(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}

impl From<PathResolver> for Route {
    fn from(path: PathResolver) -> Self {
        Self::Path(Arc::new(path))
    }
}

impl From<DomainResolver> for Route {
    fn from(domain: DomainResolver) -> Self {
        Self::Domain(Arc::new(domain))
    }
}

impl From<VerbResolver> for Route {
    fn from(verb: VerbResolver) -> Self {
        Self::Verb(Arc::new(verb))
    }
}

struct FnResolver<F>(F);

impl<F> Resolve for FnResolver<F>
where
    F: Fn(&mut Cursor<'_>) -> Resolution + Send + Sync,
{
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        (self.0)(cursor)
    }
}

/// Segments swallowed by `&` path entries, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(pub Vec<String>);

/// Path left unconsumed when the handler was reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemainingPath(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathProgress {
    Untouched,
    Consuming,
    Released,
}

/// Per-request routing state.
///
/// Host and path are normalized lazily, the first time a step asks for them,
/// so graphs that never look at the host pay nothing for it.
pub struct Cursor<'r> {
    parts: &'r Parts,
    host: Option<String>,
    path: Option<String>,
    progress: PathProgress,
    captures: Vec<String>,
}

impl<'r> Cursor<'r> {
    pub fn new(parts: &'r Parts) -> Self {
        Self {
            parts,
            host: None,
            path: None,
            progress: PathProgress::Untouched,
            captures: Vec::new(),
        }
    }

    pub fn parts(&self) -> &'r Parts {
        self.parts
    }

    pub fn method(&self) -> &'r Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &'r Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &'r HeaderMap {
        &self.parts.headers
    }

    /// Host labels not yet consumed by a domain step.
    pub fn remaining_host(&mut self) -> &str {
        let parts = self.parts;
        self.host
            .get_or_insert_with(|| normalize_host(request_host(&parts.headers, &parts.uri)))
    }

    pub fn set_remaining_host(&mut self, host: impl Into<String>) {
        self.host = Some(host.into());
    }

    /// Path segments not yet consumed by a path step.
    pub fn remaining_path(&mut self) -> &str {
        let parts = self.parts;
        self.path
            .get_or_insert_with(|| normalize_path(parts.uri.path()))
    }

    /// Record that a path step consumed input; `rest` is what remains.
    /// Leftover segments must be claimed again, even below a mount.
    pub fn advance_path(&mut self, rest: impl Into<String>) {
        self.path = Some(rest.into());
        self.progress = PathProgress::Consuming;
    }

    /// Hand the rest of the path to whatever handler comes next.
    pub fn release_path(&mut self, rest: impl Into<String>) {
        self.path = Some(rest.into());
        self.progress = PathProgress::Released;
    }

    pub fn capture(&mut self, segment: impl Into<String>) {
        self.captures.push(segment.into());
    }

    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// True when path routing started but left segments nobody claimed.
    pub(crate) fn has_unclaimed_path(&self) -> bool {
        self.progress == PathProgress::Consuming
            && self.path.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub(crate) fn into_extras(self) -> (Captures, RemainingPath) {
        (
            Captures(self.captures),
            RemainingPath(self.path.unwrap_or_default()),
        )
    }
}

//! Route table compilation.
//!
//! # Data Flow
//! ```text
//! RouteConfig[]
//!     → group by host pattern (host-less routes form the fallback group)
//!     → per group: insert path patterns into a segment tree
//!     → per tree node: PathResolver, wrapped in CatchAll when `*` is bound
//!     → per leaf: VerbResolver → action handler
//!     → HostTable tries exact hosts, then wildcard patterns, then fallback
//! ```
//!
//! # Design Decisions
//! - Every conflict is collected and reported at once; nothing is served
//!   from a table that failed to compile
//! - `*` in a host pattern is one label, so `*.example.com` does not serve
//!   `example.com` or `a.b.example.com`
//! - A trailing `*` path segment catches whatever the rest of its subtree
//!   does not serve

use std::collections::BTreeMap;
use std::fmt;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::IntoResponse;

use crate::config::schema::{RouteAction, RouteConfig};
use crate::http::handler::Handler;
use crate::http::respond;
use crate::routing::domain::DomainResolver;
use crate::routing::error::RouteError;
use crate::routing::path::{PathResolver, WILDCARD};
use crate::routing::resolve::{Cursor, Resolution, Resolve, Route};
use crate::routing::verb::{VerbHooks, VerbResolver};

const CATCH_ALL: &str = "*";

/// Options applied to every compiled route.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Answer OPTIONS with the bound methods.
    pub answer_options: bool,
}

impl TableOptions {
    fn hooks(&self) -> VerbHooks {
        if self.answer_options {
            VerbHooks::standard()
        } else {
            VerbHooks::default()
        }
    }
}

/// Compile a route table. Returns `None` for an empty table.
pub fn compile(routes: &[RouteConfig], options: &TableOptions) -> Result<Option<Route>, RouteError> {
    if routes.is_empty() {
        return Ok(None);
    }

    let mut problems = Vec::new();
    let mut hosts: BTreeMap<String, PathNode> = BTreeMap::new();
    let mut fallback: Option<PathNode> = None;

    for (index, config) in routes.iter().enumerate() {
        let label = config.label(index);
        let Some(handler) = action_handler(&config.action, &label, &mut problems) else {
            continue;
        };

        let mut methods = Vec::new();
        for name in &config.methods {
            match Method::from_bytes(name.to_ascii_uppercase().as_bytes()) {
                Ok(method) => methods.push(method),
                Err(_) => problems.push(format!("{}: invalid method {:?}", label, name)),
            }
        }
        if methods.is_empty() {
            methods.push(Method::GET);
        }

        let (tree, host_desc) = match &config.host {
            Some(host) => {
                let key = normalize_pattern(host);
                let desc = key.clone();
                (hosts.entry(key).or_default(), desc)
            }
            None => (fallback.get_or_insert_with(PathNode::default), "*any*".to_string()),
        };

        let scope = format!("{}{}", host_desc, config.path);
        let Some(mut slot) = tree.node_for(&config.path, &label, &mut problems) else {
            continue;
        };
        for method in methods {
            let binding = Binding {
                method,
                handler: handler.clone(),
                label: label.clone(),
            };
            slot.bind(binding, &scope, &mut problems);
        }
    }

    if !problems.is_empty() {
        return Err(RouteError::misconfigured("route table", problems));
    }

    let hooks = options.hooks();
    let fallback = fallback.map(|tree| tree.compile(&hooks)).transpose()?;
    if hosts.is_empty() {
        tracing::info!(routes = routes.len(), "Route table compiled");
        return Ok(fallback);
    }

    let host_count = hosts.len();
    let table = HostTable::build(hosts, fallback, &hooks)?;
    tracing::info!(routes = routes.len(), hosts = host_count, "Route table compiled");
    Ok(Some(Route::custom(table)))
}

/// Lowercase, no trailing dot.
fn normalize_pattern(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Split `*.*.example.com` into (2, `example.com`).
fn split_wildcards(pattern: &str) -> (usize, &str) {
    let mut rest = pattern;
    let mut wildcards = 0;
    while let Some(tail) = rest.strip_prefix("*.") {
        wildcards += 1;
        rest = tail;
    }
    (wildcards, rest)
}

fn action_handler(action: &RouteAction, label: &str, problems: &mut Vec<String>) -> Option<Handler> {
    match action {
        RouteAction::Respond {
            status,
            body,
            content_type,
        } => {
            let Ok(status) = StatusCode::from_u16(*status) else {
                problems.push(format!("{}: invalid status {}", label, status));
                return None;
            };
            let content_type = content_type.as_deref().unwrap_or("text/plain; charset=utf-8");
            let Ok(content_type) = HeaderValue::from_str(content_type) else {
                problems.push(format!("{}: invalid content type {:?}", label, content_type));
                return None;
            };
            let body = body.clone();
            Some(Handler::new(move |_req: Request<Body>| {
                let res = (status, [(header::CONTENT_TYPE, content_type.clone())], body.clone())
                    .into_response();
                async move { res }
            }))
        }
        RouteAction::Redirect { location, status } => {
            let Ok(status) = StatusCode::from_u16(*status) else {
                problems.push(format!("{}: invalid status {}", label, status));
                return None;
            };
            let location = location.clone();
            Some(Handler::new(move |req: Request<Body>| {
                let res = respond::redirect(status, req.uri().path(), req.method(), &location);
                async move { res }
            }))
        }
    }
}

struct Binding {
    method: Method,
    handler: Handler,
    label: String,
}

/// Segment tree collected from path patterns before compilation.
#[derive(Default)]
struct PathNode {
    here: Vec<Binding>,
    children: BTreeMap<String, PathNode>,
    wildcard: Option<Box<PathNode>>,
    catch_all: Vec<Binding>,
}

impl PathNode {
    /// Walk to the node a pattern names, creating it as needed. A trailing `*`
    /// yields the owning node as a catch-all slot.
    fn node_for(&mut self, pattern: &str, label: &str, problems: &mut Vec<String>) -> Option<Slot<'_>> {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;

        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            node = match *segment {
                CATCH_ALL if last => return Some(Slot::CatchAll(node)),
                s if s.contains(CATCH_ALL) => {
                    problems.push(format!(
                        "{}: `*` must be the last path segment in {:?}",
                        label, pattern
                    ));
                    return None;
                }
                WILDCARD => node.wildcard.get_or_insert_with(Box::default).as_mut(),
                s => node.children.entry(s.to_string()).or_default(),
            };
        }
        Some(Slot::Here(node))
    }

    fn compile(self, hooks: &VerbHooks) -> Result<Route, RouteError> {
        let mut builder = PathResolver::builder();
        if !self.here.is_empty() {
            builder = builder.here(verbs(self.here, hooks)?);
        }
        for (segment, child) in self.children {
            builder = builder.at(&segment, child.compile(hooks)?);
        }
        if let Some(wildcard) = self.wildcard {
            builder = builder.wildcard(wildcard.compile(hooks)?);
        }
        let paths = builder.build()?;

        if self.catch_all.is_empty() {
            return Ok(paths.into());
        }
        Ok(Route::custom(CatchAll {
            primary: paths,
            catch_all: verbs(self.catch_all, hooks)?,
        }))
    }
}

enum Slot<'a> {
    Here(&'a mut PathNode),
    CatchAll(&'a mut PathNode),
}

impl Slot<'_> {
    fn bind(&mut self, binding: Binding, scope: &str, problems: &mut Vec<String>) {
        let list = match self {
            Slot::Here(node) => &mut node.here,
            Slot::CatchAll(node) => &mut node.catch_all,
        };
        if let Some(existing) = list.iter().find(|b| b.method == binding.method) {
            problems.push(format!(
                "{} and {} both serve {} {}",
                existing.label, binding.label, binding.method, scope
            ));
            return;
        }
        list.push(binding);
    }
}

fn verbs(bindings: Vec<Binding>, hooks: &VerbHooks) -> Result<Route, RouteError> {
    let mut builder = VerbResolver::builder().hooks(hooks.clone());
    for binding in bindings {
        builder = builder.method(binding.method, binding.handler);
    }
    Ok(builder.build()?.into())
}

/// Serves its subtree, and hands anything the subtree cannot serve to the
/// catch-all route with the remaining path released.
struct CatchAll {
    primary: PathResolver,
    catch_all: Route,
}

impl Resolve for CatchAll {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        let path = cursor.remaining_path().to_string();

        if let Some(descent) = self.primary.descend(&path) {
            let complete = descent.released
                || descent.rest.is_empty()
                || matches!(descent.route, Route::Custom(_) | Route::Domain(_));
            if complete {
                for segment in descent.captures {
                    cursor.capture(segment);
                }
                if descent.released {
                    cursor.release_path(descent.rest);
                } else {
                    cursor.advance_path(descent.rest);
                }
                return Resolution::Continue(descent.route);
            }
        }

        tracing::trace!(path = %path, "Falling back to catch-all");
        cursor.release_path(path);
        Resolution::Continue(self.catch_all.clone())
    }
}

/// Host dispatch over exact patterns, wildcard patterns and the fallback.
struct HostTable {
    candidates: Vec<(String, DomainResolver)>,
    fallback: Option<Route>,
}

impl HostTable {
    fn build(
        hosts: BTreeMap<String, PathNode>,
        fallback: Option<Route>,
        hooks: &VerbHooks,
    ) -> Result<Self, RouteError> {
        let mut exact = DomainResolver::builder();
        let mut has_exact = false;
        let mut wildcards = Vec::new();

        for (pattern, tree) in hosts {
            let leaf = DomainResolver::builder().here(tree.compile(hooks)?).build()?;
            let (depth, base) = split_wildcards(&pattern);
            if depth == 0 {
                exact = exact.at(base, leaf);
                has_exact = true;
                continue;
            }

            let mut inner = leaf;
            for _ in 0..depth {
                inner = DomainResolver::any_label_then(inner);
            }
            let resolver = DomainResolver::builder().at(base, inner).build()?;
            let literal_labels = base.split('.').count();
            wildcards.push((literal_labels, depth, pattern.clone(), resolver));
        }

        // More specific patterns first: more literal labels, then fewer wildcards.
        wildcards.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut candidates = Vec::with_capacity(wildcards.len() + 1);
        if has_exact {
            candidates.push(("exact hosts".to_string(), exact.build()?));
        }
        candidates.extend(wildcards.into_iter().map(|(_, _, pattern, r)| (pattern, r)));

        Ok(Self {
            candidates,
            fallback,
        })
    }
}

impl Resolve for HostTable {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        let host = cursor.remaining_host().to_string();

        for (name, candidate) in &self.candidates {
            if let Some((route, rest)) = candidate.descend(&host) {
                tracing::trace!(host = %host, candidate = %name, "Host matched");
                cursor.set_remaining_host(rest);
                return Resolution::Continue(route);
            }
        }

        match &self.fallback {
            Some(route) => Resolution::Continue(route.clone()),
            None => Resolution::NoMatch,
        }
    }
}

impl fmt::Debug for HostTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.candidates.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("HostTable")
            .field("candidates", &names)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

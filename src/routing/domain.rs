//! Domain trie resolution.
//!
//! # Responsibilities
//! - Normalize the request host (port, case, empty labels)
//! - Peel labels from the top-level end towards the subdomain end
//! - Allow flat multi-label keys through whole-host and suffix matching
//! - Match any single label through wildcard layers
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Suffix matches respect label boundaries; the longest suffix wins
//! - A wildcard layer pops the highest remaining label like any other hop, so
//!   `*.example.com` is an `example.com` entry holding one wildcard layer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::routing::error::RouteError;
use crate::routing::resolve::{Cursor, Resolution, Resolve, Route};

/// Key of the entry used when the host is fully consumed.
pub const HERE: &str = "";

fn strip_port(raw: &str) -> &str {
    if let Some(bracketed) = raw.strip_prefix('[') {
        return bracketed.split_once(']').map(|(ip, _)| ip).unwrap_or(bracketed);
    }
    raw.split_once(':').map(|(host, _)| host).unwrap_or(raw)
}

fn normalize_labels(raw: &str) -> String {
    raw.split('.')
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".")
        .to_ascii_lowercase()
}

/// Strip the port and collapse empty labels: `A.com..:80` → `a.com`.
pub fn normalize_host(raw: &str) -> String {
    normalize_labels(strip_port(raw))
}

/// Split off the highest-level label: `a.b.c` → (`a.b`, `c`).
pub fn pop_level(host: &str) -> (&str, &str) {
    host.rsplit_once('.').unwrap_or(("", host))
}

/// Which precedence rule produced a [`DomainMatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainMatchKind {
    Whole,
    Label,
    Suffix,
    AnyLabel(String),
}

/// A single hop through a [`DomainResolver`].
#[derive(Debug, Clone)]
pub struct DomainMatch {
    pub route: Route,
    pub rest: String,
    pub kind: DomainMatchKind,
}

enum DomainNode {
    Labels(HashMap<String, Route>),
    AnyLabel(Arc<DomainResolver>),
}

/// A trie node keyed by trailing host labels.
pub struct DomainResolver {
    node: DomainNode,
}

impl DomainResolver {
    pub fn builder() -> DomainResolverBuilder {
        DomainResolverBuilder::default()
    }

    /// A wildcard layer: drops one label, whatever it is, then asks `inner`.
    pub fn any_label_then(inner: DomainResolver) -> Self {
        Self {
            node: DomainNode::AnyLabel(Arc::new(inner)),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.node, DomainNode::AnyLabel(_))
    }

    /// Take one hop for the unconsumed, normalized `host`.
    pub fn subdomain(&self, host: &str) -> Option<DomainMatch> {
        let entries = match &self.node {
            DomainNode::AnyLabel(inner) => {
                if host.is_empty() {
                    return None;
                }
                let (rest, label) = pop_level(host);
                return Some(DomainMatch {
                    route: Route::Domain(inner.clone()),
                    rest: rest.to_string(),
                    kind: DomainMatchKind::AnyLabel(label.to_string()),
                });
            }
            DomainNode::Labels(entries) => entries,
        };

        if let Some(route) = entries.get(host) {
            return Some(DomainMatch {
                route: route.clone(),
                rest: String::new(),
                kind: DomainMatchKind::Whole,
            });
        }

        let (rest, label) = pop_level(host);
        if !host.is_empty() {
            if let Some(route) = entries.get(label) {
                return Some(DomainMatch {
                    route: route.clone(),
                    rest: rest.to_string(),
                    kind: DomainMatchKind::Label,
                });
            }
        }

        entries
            .iter()
            .filter(|(key, _)| {
                !key.is_empty()
                    && host.len() > key.len()
                    && host.ends_with(key.as_str())
                    && host.as_bytes()[host.len() - key.len() - 1] == b'.'
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(key, route)| DomainMatch {
                route: route.clone(),
                rest: host[..host.len() - key.len() - 1]
                    .trim_end_matches('.')
                    .to_string(),
                kind: DomainMatchKind::Suffix,
            })
    }

    /// Follow nested domain resolvers from `host` until a different kind of
    /// step, or a dead end, is reached. Returns the route and leftover labels.
    pub fn descend(&self, host: &str) -> Option<(Route, String)> {
        let mut hop = self.subdomain(host)?;
        loop {
            let next = match hop.route {
                Route::Domain(next) => next,
                route => return Some((route, hop.rest)),
            };
            hop = next.subdomain(&hop.rest)?;
        }
    }
}

impl Resolve for DomainResolver {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        let host = cursor.remaining_host().to_string();
        match self.subdomain(&host) {
            Some(hop) => {
                tracing::trace!(host = %host, rest = %hop.rest, kind = ?hop.kind, "Domain hop");
                cursor.set_remaining_host(hop.rest);
                Resolution::Continue(hop.route)
            }
            None => {
                tracing::trace!(host = %host, "No domain entry matched");
                Resolution::NoMatch
            }
        }
    }
}

impl fmt::Debug for DomainResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            DomainNode::AnyLabel(inner) => f.debug_tuple("AnyLabelThen").field(inner).finish(),
            DomainNode::Labels(entries) => {
                let mut keys: Vec<&str> = entries.keys().map(String::as_str).collect();
                keys.sort_unstable();
                f.debug_struct("DomainResolver").field("keys", &keys).finish()
            }
        }
    }
}

/// Collects bindings; problems are reported together by [`build`](Self::build).
#[derive(Default)]
pub struct DomainResolverBuilder {
    entries: HashMap<String, Route>,
    problems: Vec<String>,
}

impl DomainResolverBuilder {
    /// Bind `route` to one or more trailing labels, e.g. `com` or `example.com`.
    pub fn at(mut self, key: &str, route: impl Into<Route>) -> Self {
        let normalized = normalize_labels(key);
        if normalized.split('.').any(|label| label == "*") {
            self.problems.push(format!(
                "wildcard label in domain key {:?}; wrap with any_label_then instead",
                key
            ));
        }
        if self.entries.insert(normalized, route.into()).is_some() {
            self.problems.push(format!("domain key {:?} bound twice", key));
        }
        self
    }

    /// Bind the route used when the host is fully consumed.
    pub fn here(self, route: impl Into<Route>) -> Self {
        self.at(HERE, route)
    }

    pub fn build(self) -> Result<DomainResolver, RouteError> {
        if !self.problems.is_empty() {
            return Err(RouteError::misconfigured("domain resolver", self.problems));
        }
        Ok(DomainResolver {
            node: DomainNode::Labels(self.entries),
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
    fn test_pop_level() {
        assert_eq!(pop_level("a.b.c"), ("a.b", "c"));
        assert_eq!(pop_level("com"), ("", "com"));
        assert_eq!(pop_level(""), ("", ""));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("a.com.."), "a.com");
        assert_eq!(normalize_host("x.com..x"), "x.com.x");
        assert_eq!(normalize_host("WWW.Example.COM:8080"), "www.example.com");
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host(""), "");
    }

    #[test]
    fn test_whole_then_label_then_suffix() {
        let whole = handler("whole");
        let label = handler("label");
        let suffix = handler("suffix");
        let d = DomainResolver::builder()
            .at("www.example.com", whole.clone())
            .at("org", label.clone())
            .at("example.com", suffix.clone())
            .build()
            .unwrap();

        let hop = d.subdomain("www.example.com").unwrap();
        assert!(is(&hop.route, &whole));
        assert_eq!(hop.kind, DomainMatchKind::Whole);
        assert_eq!(hop.rest, "");

        let hop = d.subdomain("docs.rust.org").unwrap();
        assert!(is(&hop.route, &label));
        assert_eq!(hop.rest, "docs.rust");

        let hop = d.subdomain("api.v2.example.com").unwrap();
        assert!(is(&hop.route, &suffix));
        assert_eq!(hop.kind, DomainMatchKind::Suffix);
        assert_eq!(hop.rest, "api.v2");
    }

    #[test]
    fn test_suffix_respects_label_boundaries() {
        let d = DomainResolver::builder()
            .at("example.com", handler("x"))
            .build()
            .unwrap();
        assert!(d.subdomain("badexample.com").is_none());
        assert!(d.subdomain("example.org").is_none());
    }

    #[test]
    fn test_longest_suffix_wins() {
        let short = handler("short");
        let long = handler("long");
        let d = DomainResolver::builder()
            .at("example.com", short.clone())
            .at("api.example.com", long.clone())
            .build()
            .unwrap();

        let hop = d.subdomain("v1.api.example.com").unwrap();
        assert!(is(&hop.route, &long));
        assert_eq!(hop.rest, "v1");
    }

    #[test]
    fn test_here_entry_terminates_consumed_host() {
        let root = handler("root");
        let d = DomainResolver::builder().here(root.clone()).build().unwrap();
        assert!(is(&d.subdomain("").unwrap().route, &root));
        assert!(d.subdomain("www").is_none());
    }

    #[test]
    fn test_descend_nested_subdomains() {
        let any = handler("any");
        let all = handler("all");
        let cool = DomainResolver::builder()
            .at("any", any.clone())
            .at(
                "many",
                DomainResolver::builder().at("all", all.clone()).build().unwrap(),
            )
            .build()
            .unwrap();
        let root = DomainResolver::builder().at("cool.com", cool).build().unwrap();

        let (route, rest) = root.descend("any.cool.com").unwrap();
        assert!(is(&route, &any));
        assert_eq!(rest, "");

        let (route, _) = root.descend("all.many.cool.com").unwrap();
        assert!(is(&route, &all));

        assert!(root.descend("none.cool.com").is_none());
    }

    #[test]
    fn test_wildcard_nested_twice() {
        let target = handler("target");
        let leaf = DomainResolver::builder().here(target.clone()).build().unwrap();
        let twice = DomainResolver::any_label_then(DomainResolver::any_label_then(leaf));
        assert!(twice.is_wildcard());
        let root = DomainResolver::builder().at("example.com", twice).build().unwrap();

        let (route, rest) = root.descend("x.y.example.com").unwrap();
        assert!(is(&route, &target));
        assert_eq!(rest, "");

        // Labels run out before the second wildcard.
        assert!(root.descend("y.example.com").is_none());
        assert!(root.descend("example.com").is_none());
        // Three labels leave one behind, so the leaf has no entry for it.
        assert!(root.descend("w.x.y.example.com").is_none());
    }

    #[test]
    fn test_wildcard_pops_highest_label() {
        let www = handler("www");
        let star = DomainResolver::any_label_then(
            DomainResolver::builder().at("www", www.clone()).build().unwrap(),
        );
        let hop = star.subdomain("www.example").unwrap();
        assert_eq!(hop.kind, DomainMatchKind::AnyLabel("example".into()));
        assert_eq!(hop.rest, "www");

        let (route, rest) = star.descend("www.example").unwrap();
        assert!(is(&route, &www));
        assert_eq!(rest, "");

        assert!(star.subdomain("").is_none());
    }

    #[test]
    fn test_builder_rejects_wildcards_and_duplicates() {
        let err = DomainResolver::builder()
            .at("*.example.com", handler("a"))
            .at("Example.com", handler("b"))
            .at("example.com.", handler("c"))
            .build()
            .unwrap_err();
        match err {
            RouteError::Misconfigured { problems, .. } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error {:?}", other),
        }
    }
}

//! HTTP method resolution.
//!
//! # Responsibilities
//! - Dispatch on the request method
//! - Answer OPTIONS from the bound method set when a responder is configured
//! - Answer unbound methods with 405 and an `Allow` header
//!
//! # Design Decisions
//! - Hooks are part of each resolver, not process-wide state
//! - Synthetic handlers are built once, when the resolver is built
//! - Methods are reported in binding order

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;

use crate::http::handler::{Handler, RequestInfo};
use crate::http::respond;
use crate::routing::error::RouteError;
use crate::routing::resolve::{Cursor, Resolution, Resolve, Route};

/// Responder that receives the methods a resolver serves.
pub type MethodsHook = Arc<dyn Fn(&[Method], &RequestInfo) -> Response + Send + Sync>;

/// OPTIONS and Method-Not-Allowed responders for a [`VerbResolver`].
#[derive(Clone, Default)]
pub struct VerbHooks {
    pub options: Option<MethodsHook>,
    pub method_not_allowed: Option<MethodsHook>,
}

impl VerbHooks {
    /// `204` with `Allow` for OPTIONS, plain-text `405` for the rest.
    pub fn standard() -> Self {
        Self {
            options: Some(Arc::new(respond::options)),
            method_not_allowed: Some(Arc::new(respond::method_not_allowed)),
        }
    }

    pub fn with_options<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[Method], &RequestInfo) -> Response + Send + Sync + 'static,
    {
        self.options = Some(Arc::new(hook));
        self
    }

    pub fn with_method_not_allowed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[Method], &RequestInfo) -> Response + Send + Sync + 'static,
    {
        self.method_not_allowed = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for VerbHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbHooks")
            .field("options", &self.options.is_some())
            .field("method_not_allowed", &self.method_not_allowed.is_some())
            .finish()
    }
}

/// A flat map from HTTP method to the next step.
pub struct VerbResolver {
    methods: Vec<(Method, Route)>,
    options: Option<Handler>,
    not_allowed: Option<Handler>,
}

impl VerbResolver {
    pub fn builder() -> VerbResolverBuilder {
        VerbResolverBuilder::default()
    }

    /// Serve `route` for GET; everything else is a 405.
    pub fn get_only(route: impl Into<Route>) -> Self {
        Self::assemble(vec![(Method::GET, route.into())], VerbHooks::default())
    }

    fn assemble(methods: Vec<(Method, Route)>, hooks: VerbHooks) -> Self {
        let allowed: Arc<[Method]> = methods.iter().map(|(m, _)| m.clone()).collect();
        let mut with_options = allowed.to_vec();
        if !with_options.contains(&Method::OPTIONS) {
            with_options.push(Method::OPTIONS);
        }

        let options = hooks
            .options
            .map(|hook| methods_handler(hook, with_options.into(), None));

        let unconfigured =
            methods.is_empty() && hooks.method_not_allowed.is_none() && options.is_none();
        let not_allowed = if unconfigured {
            None
        } else {
            let hook: MethodsHook = match hooks.method_not_allowed {
                Some(hook) => hook,
                None => Arc::new(respond::method_not_allowed),
            };
            Some(methods_handler(hook, allowed, Some(StatusCode::METHOD_NOT_ALLOWED)))
        };

        Self {
            methods,
            options,
            not_allowed,
        }
    }

    /// Methods with a binding, in binding order.
    pub fn allowed(&self) -> Vec<Method> {
        self.methods.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn route_for(&self, method: &Method) -> Option<&Route> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, route)| route)
    }
}

/// Terminal handler that hands the method list to `hook`. A forced status
/// overrides whatever the hook chose, and `Allow` is filled in when missing.
fn methods_handler(hook: MethodsHook, methods: Arc<[Method]>, status: Option<StatusCode>) -> Handler {
    Handler::new(move |req: Request<Body>| {
        let hook = hook.clone();
        let methods = methods.clone();
        async move {
            let info = RequestInfo::of(&req);
            if status == Some(StatusCode::METHOD_NOT_ALLOWED) {
                tracing::warn!(method = %info.method, path = %info.uri.path(), "Method not allowed");
            }

            let mut res = hook(&methods[..], &info);
            if let Some(status) = status {
                *res.status_mut() = status;
            }
            res.headers_mut()
                .entry(header::ALLOW)
                .or_insert_with(|| respond::allow_value(&methods[..]));
            res
        }
    })
}

impl Resolve for VerbResolver {
    fn resolve(&self, cursor: &mut Cursor<'_>) -> Resolution {
        let method = cursor.method();

        if method == Method::OPTIONS {
            if let Some(options) = &self.options {
                return Resolution::Terminal(options.clone());
            }
        }

        if let Some(route) = self.route_for(method) {
            return Resolution::Continue(route.clone());
        }

        match &self.not_allowed {
            Some(handler) => Resolution::Terminal(handler.clone()),
            None => Resolution::NoMatch,
        }
    }
}

impl fmt::Debug for VerbResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|(m, _)| m.as_str()).collect();
        f.debug_struct("VerbResolver")
            .field("methods", &methods)
            .field("answers_options", &self.options.is_some())
            .finish()
    }
}

/// Collects bindings; problems are reported together by [`build`](Self::build).
#[derive(Default)]
pub struct VerbResolverBuilder {
    methods: Vec<(Method, Route)>,
    hooks: VerbHooks,
    problems: Vec<String>,
}

impl VerbResolverBuilder {
    pub fn hooks(mut self, hooks: VerbHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn method(mut self, method: Method, route: impl Into<Route>) -> Self {
        if self.methods.iter().any(|(m, _)| *m == method) {
            self.problems.push(format!("method {} bound twice", method));
        }
        self.methods.push((method, route.into()));
        self
    }

    pub fn get(self, route: impl Into<Route>) -> Self {
        self.method(Method::GET, route)
    }

    pub fn post(self, route: impl Into<Route>) -> Self {
        self.method(Method::POST, route)
    }

    pub fn put(self, route: impl Into<Route>) -> Self {
        self.method(Method::PUT, route)
    }

    pub fn patch(self, route: impl Into<Route>) -> Self {
        self.method(Method::PATCH, route)
    }

    pub fn delete(self, route: impl Into<Route>) -> Self {
        self.method(Method::DELETE, route)
    }

    pub fn head(self, route: impl Into<Route>) -> Self {
        self.method(Method::HEAD, route)
    }

    pub fn options(self, route: impl Into<Route>) -> Self {
        self.method(Method::OPTIONS, route)
    }

    pub fn build(mut self) -> Result<VerbResolver, RouteError> {
        if self.hooks.options.is_some() && self.methods.iter().any(|(m, _)| m == Method::OPTIONS) {
            self.problems
                .push("OPTIONS is bound but the OPTIONS responder shadows it".to_string());
        }
        if !self.problems.is_empty() {
            return Err(RouteError::misconfigured("verb resolver", self.problems));
        }
        Ok(VerbResolver::assemble(self.methods, self.hooks))
    }
}

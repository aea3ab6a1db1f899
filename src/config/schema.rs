//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so an empty file is a valid (if useless) config.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Driver loop settings.
    pub routing: RoutingConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Route table, compiled into routing tries at startup.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Driver loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Resolution steps allowed per request before it is treated as a cycle.
    pub max_depth: usize,

    /// Answer OPTIONS with the bound methods instead of a 405.
    pub answer_options: bool,

    /// Include request details in 404 and 500 bodies.
    pub diagnostics: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            answer_options: true,
            diagnostics: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: Option<String>,

    /// Assign and echo `x-request-id`.
    pub request_id: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            request_id: true,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One entry of the route table.
///
/// `host` may start with `*` labels (`*.example.com`); `path` uses literal
/// segments, `&` for any single segment and a trailing `*` for everything
/// below a prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    #[serde(default)]
    pub name: Option<String>,

    /// Host pattern; routes without one serve every unclaimed host.
    #[serde(default)]
    pub host: Option<String>,

    /// Path pattern.
    #[serde(default = "default_path")]
    pub path: String,

    /// Methods served; empty means GET only.
    #[serde(default)]
    pub methods: Vec<String>,

    pub action: RouteAction,
}

fn default_path() -> String {
    "/".to_string()
}

impl RouteConfig {
    /// Name for log lines and errors: the configured name or the position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("routes[{}]", index))
    }
}

/// What a matched route does.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteAction {
    /// Answer with a fixed body.
    Respond {
        #[serde(default = "default_respond_status")]
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default)]
        content_type: Option<String>,
    },
    /// Redirect, resolving relative targets against the request path.
    Redirect {
        location: String,
        #[serde(default = "default_redirect_status")]
        status: u16,
    },
}

fn default_respond_status() -> u16 {
    200
}

fn default_redirect_status() -> u16 {
    302
}

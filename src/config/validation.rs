//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (depth > 0, statuses, addresses)
//! - Check host, path and method patterns are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Binding conflicts are left to route table compilation, which sees the tries

use std::net::SocketAddr;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::config::schema::{AppConfig, RouteAction, RouteConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("routing.max_depth must be at least 1")]
    ZeroMaxDepth,

    #[error("{route}: invalid host pattern {host:?}")]
    InvalidHost { route: String, host: String },

    #[error("{route}: invalid path pattern {path:?}")]
    InvalidPath { route: String, path: String },

    #[error("{route}: invalid method {method:?}")]
    InvalidMethod { route: String, method: String },

    #[error("{route}: invalid status {status}")]
    InvalidStatus { route: String, status: u16 },

    #[error("{route}: redirect location is empty")]
    EmptyRedirect { route: String },
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.routing.max_depth == 0 {
        errors.push(ValidationError::ZeroMaxDepth);
    }

    for (index, route) in config.routes.iter().enumerate() {
        validate_route(&mut errors, &route.label(index), route);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn validate_route(errors: &mut Vec<ValidationError>, label: &str, route: &RouteConfig) {
    if let Some(host) = &route.host {
        if !valid_host_pattern(host) {
            errors.push(ValidationError::InvalidHost {
                route: label.to_string(),
                host: host.clone(),
            });
        }
    }

    if !valid_path_pattern(&route.path) {
        errors.push(ValidationError::InvalidPath {
            route: label.to_string(),
            path: route.path.clone(),
        });
    }

    for method in &route.methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                route: label.to_string(),
                method: method.clone(),
            });
        }
    }

    match &route.action {
        RouteAction::Respond { status, .. } => {
            if StatusCode::from_u16(*status).is_err() {
                errors.push(ValidationError::InvalidStatus {
                    route: label.to_string(),
                    status: *status,
                });
            }
        }
        RouteAction::Redirect { location, status } => {
            if !(300..400).contains(status) {
                errors.push(ValidationError::InvalidStatus {
                    route: label.to_string(),
                    status: *status,
                });
            }
            if location.trim().is_empty() {
                errors.push(ValidationError::EmptyRedirect {
                    route: label.to_string(),
                });
            }
        }
    }
}

/// Dotted labels, optionally led by `*` labels. No `*` after a literal label.
pub(crate) fn valid_host_pattern(host: &str) -> bool {
    let host = host.trim_end_matches('.');
    if host.is_empty() {
        return false;
    }
    let mut literal_seen = false;
    for label in host.split('.') {
        match label {
            "" => return false,
            "*" if literal_seen => return false,
            "*" => {}
            l if l.contains('*') || l.contains(':') || l.contains('/') => return false,
            _ => literal_seen = true,
        }
    }
    literal_seen
}

/// Absolute path; `*` only as the whole last segment.
pub(crate) fn valid_path_pattern(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.iter().enumerate().all(|(i, segment)| {
        if segment.contains('*') {
            *segment == "*" && i + 1 == segments.len()
        } else {
            true
        }
    })
}

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Apply the configured filter, letting `RUST_LOG` override it
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Initialization is idempotent so tests and the binary can both call it

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_FILTER: &str = "trie_router=info,tower_http=info";

/// Build the filter: `RUST_LOG` wins, then `configured`, then [`DEFAULT_FILTER`].
pub fn filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns false if one was already installed.
pub fn init(configured: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(filter(configured))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

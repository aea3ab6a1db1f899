//! Trie router (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ listener ─▶ TraceLayer ─▶ Pipeline (request id, ...)
//!                                                 │
//!                                                 ▼
//!                                          RouteHandler (driver loop)
//!                                                 │
//!                       ┌─────────────────────────┼──────────────────────┐
//!                       ▼                         ▼                      ▼
//!                DomainResolver ───────▶  PathResolver ───────▶  VerbResolver
//!                                                                        │
//!   Client Response                                                      ▼
//!   ◀──────────────────────────────────────────────────────────── Handler / 404 / 405 / 500
//!
//!   Cross-cutting: config (+ watcher), observability, lifecycle
//! ```
//!
//! Usage: `trie-router [CONFIG]`, defaulting to `router.toml`.

use std::path::PathBuf;

use trie_router::lifecycle::startup::{self, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    startup::run(&path).await?;
    Ok(())
}

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, method)
//!     → Cursor (lazy normalized host and path)
//!     → domain.rs (peel host labels, wildcard layers)
//!     → path.rs   (consume path segments, `&` captures, mounts)
//!     → verb.rs   (method dispatch, OPTIONS, 405)
//!     → Resolution::Terminal(handler) | NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → table.rs groups by host and path pattern
//!     → builders validate bindings
//!     → immutable tries shared by Arc
//! ```
//!
//! # Design Decisions
//! - Tries are built once and only read afterwards; no locks on the hot path
//! - No regex, no backtracking: each step commits to one child
//! - Deterministic: same input always resolves to the same handler
//! - Conflicting bindings fail the build, never a request

pub mod domain;
pub mod error;
pub mod path;
pub mod resolve;
pub mod table;
pub mod verb;

pub use domain::DomainResolver;
pub use error::RouteError;
pub use path::PathResolver;
pub use resolve::{Captures, Cursor, RemainingPath, Resolution, Resolve, Route};
pub use table::{compile, TableOptions};
pub use verb::{VerbHooks, VerbResolver};

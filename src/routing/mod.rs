//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → matcher.rs (normalize: decode unreserved, resolve dot segments)
//!     → router.rs (route lookup on the normalized path)
//!     → matcher.rs (evaluate prefix, apply rewrite)
//!     → Return: matched Route or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile matchers, rewrites and upstream URLs
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Plain list in declaration order, no trie
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{normalize_path, PathError};
pub use router::{Route, Router, Upstream};

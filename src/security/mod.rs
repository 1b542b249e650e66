//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request to upstream:
//!     → headers.rs (strip hop-by-hop, set X-Forwarded-*)
//!
//! Outgoing response to client:
//!     → headers.rs (strip hop-by-hop)
//! ```
//!
//! # Design Decisions
//! - No trust in client-supplied X-Forwarded-* unless configured
//! - Client identity headers never reach upstreams of protected routes unverified

pub mod headers;

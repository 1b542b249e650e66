//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, via axum-server)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional; without it the proxy expects a terminator in front
//!   and reconstructs the scheme from trusted forwarded headers

pub mod tls;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, access log)
//!     → request.rs (request ID, original URI reconstruction)
//!     → [routing picks the route, auth decides]
//!     → forwarder.rs (rewrite, identity headers, send upstream)
//!     → response.rs (filter headers, relay body)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;

//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (route requires auth)
//!     → credentials.rs (extract Authorization / Cookie)
//!     → introspection.rs (POST to the mode's endpoint, bounded timeout)
//!     → decision.rs (Allow{headers} | Deny{401|403})
//!     → Allow: forwarder overrides identity headers
//!     → Deny:  redirect.rs (login / access-denied redirect, bare status,
//!              or a WWW-Authenticate challenge on m2m routes)
//! ```
//!
//! # Design Decisions
//! - Introspection failures never escape this module as errors; they become
//!   `Deny(401)` before the forwarder runs
//! - No session state is kept in the proxy

pub mod credentials;
pub mod decision;
pub mod introspection;
pub mod redirect;

pub use credentials::Credentials;
pub use decision::{challenge, decide, AuthDecision, Denial, Grant};
pub use introspection::{IntrospectionClient, IntrospectionError, IntrospectionResponse};
pub use redirect::FailureRedirector;

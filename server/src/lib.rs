//! Localhost asset server for a sandboxed documentation viewer.
//!
//! Requests resolve against a canonical document root (or an explicit
//! `fsPath` override), are answered from registered in-memory content or the
//! disk, and never reveal what lies outside the root. One server per
//! [`ServerSlot`]; [`ServerSlot::global`] is the process-wide one.

pub mod http;
pub mod mime;
pub mod registry;
pub mod resolve;
pub mod respond;
mod server;
mod slot;

pub use mime::content_type_for;
pub use registry::{ContentRegistry, RegisteredContent};
pub use resolve::{DocRoot, ResolveError, resolve};
pub use respond::{ContentResult, DEFAULT_CSP, Status, not_found, respond};
pub use server::{RunningServer, ServerError, ServerOptions};
pub use slot::ServerSlot;

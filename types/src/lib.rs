//! Core domain types for docview.
//!
//! This crate contains the data shared by the asset server, the viewer bridge
//! and the CLI: inbound document requests, resolved assets, the embedded
//! server's connection info and the viewer message envelope.
//!
//! No IO, no async. Everything here can be used from any layer.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod message;
mod request;

pub use message::{CorrelationId, SPHINX_MESSAGE_TYPE, ViewerMessage, ViewerMessageError};
pub use request::{
    DocumentRequest, FS_PATH_PARAM, LOCALHOST, ResolvedAsset, ServerConnectionInfo,
};

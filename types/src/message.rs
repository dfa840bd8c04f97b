//! Viewer message envelope.
//!
//! The host and a rendering surface exchange a single JSON shape:
//!
//! ```text
//! { "type": "sphinx", "content": "<url>", "id": 7 }
//! ```
//!
//! Host → viewer means "resource ready at URL"; viewer → host means "open this
//! resource". The `id` field correlates a ready notification with the request
//! that produced it. It is omitted when absent, so peers that only know the
//! two-field envelope keep working.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire value of the `type` tag for documentation resource messages.
pub const SPHINX_MESSAGE_TYPE: &str = "sphinx";

/// Correlates a resource-ready notification with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ViewerMessageError {
    #[error("malformed viewer message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Message exchanged with a viewer surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// A documentation resource, addressed by URL.
    Sphinx {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },
}

impl ViewerMessage {
    /// Host → viewer notification that `url` can be loaded.
    #[must_use]
    pub fn resource_ready(url: impl Into<String>, id: CorrelationId) -> Self {
        Self::Sphinx {
            content: url.into(),
            id: Some(id),
        }
    }

    /// Viewer → host request to open a resource. Uncorrelated.
    #[must_use]
    pub fn open_resource(url: impl Into<String>) -> Self {
        Self::Sphinx {
            content: url.into(),
            id: None,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Sphinx { content, .. } => content,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<CorrelationId> {
        match self {
            Self::Sphinx { id, .. } => *id,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ViewerMessageError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ViewerMessageError> {
        Ok(serde_json::from_str(raw)?)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        // Serializing a tagged enum of strings and integers cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_ready_serializes_with_id() {
        let msg = ViewerMessage::resource_ready("http://localhost:1/a.html", CorrelationId::from_raw(7));
        assert_eq!(
            msg.to_value(),
            json!({ "type": "sphinx", "content": "http://localhost:1/a.html", "id": 7 })
        );
    }

    #[test]
    fn two_field_envelope_still_parses() {
        let msg = ViewerMessage::from_json(r#"{"type":"sphinx","content":"file:///docs/x.html"}"#)
            .expect("legacy envelope");
        assert_eq!(msg.content(), "file:///docs/x.html");
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn open_resource_omits_id_on_the_wire() {
        let value = ViewerMessage::open_resource("x").to_value();
        assert_eq!(value["type"], SPHINX_MESSAGE_TYPE);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = ViewerMessage::from_value(json!({ "type": "other", "content": "x" }));
        assert!(matches!(err, Err(ViewerMessageError::Malformed(_))));
    }

    #[test]
    fn missing_content_is_rejected() {
        assert!(ViewerMessage::from_json(r#"{"type":"sphinx"}"#).is_err());
    }

    #[test]
    fn correlation_ids_are_unique() {
        let a = CorrelationId::next();
        let b = CorrelationId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }
}

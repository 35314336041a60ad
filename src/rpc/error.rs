//! Application-level RPC errors

use std::fmt;

use serde_json::Value;

use crate::protocol::constants::{
    ERROR_URI_GENERIC, ERROR_URI_NO_SUCH_PROCEDURE, ERROR_URI_TIMEOUT,
};

/// Error reported to a caller as CALL_ERROR
///
/// Sent as `[CALL_ERROR, callId, uri, description]`, with `details`
/// appended as a fifth element when present.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{description} ({uri})")]
pub struct CallError {
    /// Error URI identifying the kind of failure
    pub uri: String,
    /// Human readable description
    pub description: String,
    /// Optional application specific details
    pub details: Option<Value>,
}

impl CallError {
    /// Generic error with the given description
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_uri(ERROR_URI_GENERIC, description)
    }

    /// Error with an application chosen URI
    pub fn with_uri(uri: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            description: description.into(),
            details: None,
        }
    }

    /// Generic error carrying the `Display` text of any error value
    pub fn from_display(err: impl fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    /// Attach error details
    pub fn details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The call was not answered in time
    pub fn timeout() -> Self {
        Self::with_uri(ERROR_URI_TIMEOUT, "call timed out")
    }

    /// No procedure is registered under `proc_uri`
    pub fn no_such_procedure(proc_uri: &str) -> Self {
        Self::with_uri(
            ERROR_URI_NO_SUCH_PROCEDURE,
            format!("no procedure registered for {proc_uri}"),
        )
    }
}

impl From<&str> for CallError {
    fn from(description: &str) -> Self {
        Self::new(description)
    }
}

impl From<String> for CallError {
    fn from(description: String) -> Self {
        Self::new(description)
    }
}

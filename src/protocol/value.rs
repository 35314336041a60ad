//! Helpers over `serde_json::Value`
//!
//! WAMP v1 peers are usually JavaScript, and several arguments (the PUBLISH
//! `exclude` flag, the optional UNSUBSCRIBE topic) are interpreted by
//! JavaScript truthiness rather than by strict type.

use serde_json::Value;

use crate::session::ClientId;

/// Extension accessors for envelope arguments
pub trait ValueExt {
    /// JavaScript truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy;
    /// arrays and objects are always truthy, even when empty.
    fn is_truthy(&self) -> bool;

    /// Interpret an array of session ids
    ///
    /// Strings are taken verbatim, numbers are stringified and anything else
    /// is skipped. Returns `None` when the value is not an array.
    fn as_client_ids(&self) -> Option<Vec<ClientId>>;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn as_client_ids(&self) -> Option<Vec<ClientId>> {
        let items = self.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(ClientId::new(s.as_str())),
                    Value::Number(n) => Some(ClientId::new(n.to_string())),
                    _ => None,
                })
                .collect(),
        )
    }
}

//! CURIE prefix resolution
//!
//! Clients declare short prefixes with PREFIX messages and may then use
//! `prefix:suffix` tokens wherever a URI is expected. Tokens whose prefix is
//! unknown pass through unchanged; failing on an unknown topic is left to
//! whoever consumes the URI.

use std::collections::HashMap;

/// Per-client mapping from prefix to base URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    prefixes: HashMap<String, String>,
}

impl PrefixTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` to `uri`, replacing any earlier binding
    ///
    /// Returns the previous base URI, if any.
    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Option<String> {
        self.prefixes.insert(prefix.into(), uri.into())
    }

    /// Base URI bound to `prefix`
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Expand a CURIE, or `None` if `token` is not one or its prefix is unknown
    pub fn resolve(&self, token: &str) -> Option<String> {
        let (prefix, suffix) = token.split_once(':')?;
        if prefix.is_empty() || suffix.is_empty() {
            return None;
        }
        self.get(prefix).map(|base| format!("{base}{suffix}"))
    }

    /// Expand a CURIE, falling back to the token itself
    pub fn resolve_or_pass(&self, token: &str) -> String {
        self.resolve(token).unwrap_or_else(|| token.to_string())
    }

    /// Number of declared prefixes
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether no prefixes are declared
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

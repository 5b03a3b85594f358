//! Type-safe identifier wrappers.
//!
//! Newtypes keep correlation ids and session tokens from being mixed up
//! with arbitrary strings at call sites.
//!
//! | Type | Origin |
//! |------|--------|
//! | [`CorrelationId`] | Generated locally (UUID v4) or echoed from the relay |
//! | [`BridgeToken`] | Supplied externally, opaque |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Identifier pairing an outbound request with its inbound response.
///
/// Locally issued ids are UUID v4 strings. Ids received from the relay are
/// kept verbatim because the relay is free to choose its own format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh, unique correlation id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// BridgeToken
// ============================================================================

/// Opaque session token identifying one bridge relay session.
///
/// `Debug` output is redacted so tokens never reach logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeToken(String);

impl BridgeToken {
    /// Wraps a token string.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is empty or whitespace.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for BridgeToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BridgeToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for BridgeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BridgeToken(<{} chars>)", self.0.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_correlation_id_serializes_as_plain_string() {
        let id = CorrelationId::from("req-7");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"req-7\"");
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = BridgeToken::new("s3cret-token");
        let debug = format!("{token:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("12 chars"));
    }

    #[test]
    fn test_blank_token() {
        assert!(BridgeToken::new("  ").is_blank());
        assert!(!BridgeToken::new("abc").is_blank());
    }
}

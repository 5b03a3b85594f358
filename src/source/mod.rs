//! Data source selection and fallback.
//!
//! Consumers ask for dashboard data by endpoint and company. The resolver
//! picks a source, attempts it, falls back to the uploaded backup snapshot
//! once, and tags the result with where it came from.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `resolver` | Source selection and the two-tier fallback chain |
//! | `rest` | Dashboard REST transport |
//! | `normalize` | Envelope shape adapter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::BridgeToken;

// ============================================================================
// Submodules
// ============================================================================

/// Envelope shape adapter.
pub mod normalize;

/// Source selection and fallback.
pub mod resolver;

/// Dashboard REST transport.
pub mod rest;

// ============================================================================
// Re-exports
// ============================================================================

pub use normalize::{NormalizedPayload, normalize};
pub use resolver::{FetchOutcome, SourceResolver};
pub use rest::{DashboardRequest, DashboardTransport, RestDashboardClient};

// ============================================================================
// DataSource
// ============================================================================

/// Where a result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// The ledger system, reached directly by the backend.
    #[default]
    Live,
    /// The ledger system, reached through the relay.
    Bridge,
    /// The most recent uploaded snapshot.
    Backup,
}

impl DataSource {
    /// Lowercase name used in query strings and outcomes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Bridge => "bridge",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "bridge" => Ok(Self::Bridge),
            "backup" => Ok(Self::Backup),
            other => Err(Error::config(format!(
                "unknown data source {other:?}, expected live, bridge or backup"
            ))),
        }
    }
}

// ============================================================================
// SourceSelection
// ============================================================================

/// Source requested by a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceSelection {
    /// Follow the stored connection type.
    #[default]
    Auto,
    /// Use the given source.
    Explicit(DataSource),
}

impl From<DataSource> for SourceSelection {
    fn from(source: DataSource) -> Self {
        Self::Explicit(source)
    }
}

impl FromStr for SourceSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Explicit)
        }
    }
}

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Per-session connection preferences.
///
/// Shared between the session and its resolver; updates are visible to the
/// next fetch.
#[derive(Debug, Default)]
pub struct ConnectionSettings {
    connection_type: RwLock<DataSource>,
    bridge_token: RwLock<Option<BridgeToken>>,
}

impl ConnectionSettings {
    /// Creates settings with the given initial values.
    #[must_use]
    pub fn new(connection_type: DataSource, bridge_token: Option<BridgeToken>) -> Self {
        Self {
            connection_type: RwLock::new(connection_type),
            bridge_token: RwLock::new(bridge_token),
        }
    }

    #[inline]
    #[must_use]
    pub fn connection_type(&self) -> DataSource {
        *self.connection_type.read()
    }

    pub fn set_connection_type(&self, source: DataSource) {
        *self.connection_type.write() = source;
    }

    #[must_use]
    pub fn bridge_token(&self) -> Option<BridgeToken> {
        self.bridge_token.read().clone()
    }

    /// Stores the token; blank tokens clear it.
    pub fn set_bridge_token(&self, token: Option<BridgeToken>) {
        *self.bridge_token.write() = token.filter(|t| !t.is_blank());
    }

    /// Returns `true` when the stored connection type is the relay.
    #[inline]
    #[must_use]
    pub fn is_bridge_mode(&self) -> bool {
        self.connection_type() == DataSource::Bridge
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_names() {
        assert_eq!(DataSource::Backup.to_string(), "backup");
        assert_eq!(" Bridge ".parse::<DataSource>().expect("parse"), DataSource::Bridge);
        assert!("cache".parse::<DataSource>().is_err());
        assert_eq!(
            serde_json::to_string(&DataSource::Live).expect("json"),
            "\"live\""
        );
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!("auto".parse::<SourceSelection>().expect("auto"), SourceSelection::Auto);
        assert_eq!(
            "backup".parse::<SourceSelection>().expect("backup"),
            SourceSelection::Explicit(DataSource::Backup)
        );
    }

    #[test]
    fn test_settings() {
        let settings = ConnectionSettings::default();
        assert!(!settings.is_bridge_mode());

        settings.set_connection_type(DataSource::Bridge);
        settings.set_bridge_token(Some(BridgeToken::new("  ")));
        assert!(settings.is_bridge_mode());
        assert!(settings.bridge_token().is_none());

        settings.set_bridge_token(Some(BridgeToken::new("tok")));
        assert_eq!(settings.bridge_token().map(|t| t.as_str().to_string()).as_deref(), Some("tok"));
    }
}

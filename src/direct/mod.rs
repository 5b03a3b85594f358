//! Direct connector for the ledger system's local XML gateway.
//!
//! Used when the caller and the gateway share a machine or network.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | HTTP client, failure classification |
//! | `envelope` | Export/Collection request envelopes |
//! | `parse` | XML response parsing into records |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP client for the gateway.
pub mod connector;

/// Request envelope construction.
pub mod envelope;

/// Response parsing.
pub mod parse;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{ConnectionStatus, DEFAULT_GATEWAY_URL, DirectConnector};
pub use envelope::{CollectionRequest, DateRange};

//! Per-session context.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`LedgerLink`] | Owns one bridge client, connector and resolver |
//! | [`LedgerLinkBuilder`] | Fluent session builder |

// ============================================================================
// Submodules
// ============================================================================

/// Session builder.
pub mod builder;

/// Session context.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LedgerLinkBuilder;
pub use core::LedgerLink;

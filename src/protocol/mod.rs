//! Bridge protocol message types.
//!
//! JSON text frames exchanged with the relay endpoint.
//!
//! # Protocol Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `bridge_ready` | Local → Relay | Handshake with gateway snapshot |
//! | `ping` / `pong` | Both | Keepalive |
//! | `status` / `status_response` | Relay → Local → Relay | Connectivity snapshot |
//! | `tally_request` / `tally_response` | Relay → Local → Relay | Relayed gateway calls |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Envelope and built-in messages |
//! | `tally` | Relayed gateway call payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Message envelope.
pub mod message;

/// Relayed gateway calls.
pub mod tally;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{LocalStatus, Message, kinds};
pub use tally::TallyAction;

//! Relay bridge.
//!
//! Reaches a ledger system that sits behind NAT through a relay the caller
//! and the ledger machine both connect to.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Reconnecting channel with correlated requests |
//! | `agent` | Serves relayed gateway calls on the ledger machine |
//! | `state` | Lifecycle states |
//! | `reconnect` | Backoff policy |

// ============================================================================
// Submodules
// ============================================================================

/// Relayed gateway call server.
pub mod agent;

/// Relay client and event loop.
pub mod client;

/// Reconnect backoff.
pub mod reconnect;

/// Lifecycle states.
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use agent::BridgeAgent;
pub use client::{BridgeClient, MessageHandler, WeakBridgeClient};
pub use reconnect::ReconnectPolicy;
pub use state::ConnectionState;

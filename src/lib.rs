//! ledger-link - Connectivity layer for an on-premise accounting system.
//!
//! Reaches a ledger system that lives on a customer machine, either directly
//! through its local XML gateway or through a relay when it sits behind NAT,
//! and degrades to an uploaded snapshot when neither answers.
//!
//! # Architecture
//!
//! - **Bridge**: one reconnecting WebSocket to the relay per session, with
//!   correlated request/response multiplexing and keepalive
//! - **Direct**: XML-over-HTTP client for the gateway's Export/Collection
//!   protocol, parsing into normalized records
//! - **Source**: picks live, bridge or backup per request, retries once
//!   against backup, and tags the result with its provenance
//!
//! Key design principles:
//!
//! - Each [`LedgerLink`] owns its bridge client; there is no global instance
//! - Outstanding requests complete exactly once, by response or timeout
//! - The resolver never returns an error; failure is an outcome
//!
//! # Quick Start
//!
//! ```no_run
//! use ledger_link::{LedgerLink, LinkConfig, Result, SourceSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let link = LedgerLink::builder()
//!         .config(LinkConfig::from_env()?)
//!         .build()?;
//!
//!     // Direct gateway access
//!     let companies = link.connector().get_companies().await?;
//!     println!("{} companies", companies.len());
//!
//!     // Dashboard data with fallback
//!     let outcome = link.fetch("ceo", &companies[0].name, SourceSelection::Auto).await;
//!     println!("{:?} (source: {:?})", outcome.data, outcome.source);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Relay client and the agent serving relayed calls |
//! | [`config`] | Session configuration and relay URL derivation |
//! | [`direct`] | Local gateway connector |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Correlation ids and bridge tokens |
//! | [`protocol`] | Relay message types |
//! | [`records`] | Normalized ledger records |
//! | [`session`] | Per-session context |
//! | [`source`] | Source resolution and fallback |

// ============================================================================
// Modules
// ============================================================================

/// Relay client and agent.
///
/// - [`BridgeClient`] - reconnecting channel with correlated requests
/// - [`BridgeAgent`] - serves `tally_request` on the ledger machine
pub mod bridge;

/// Session configuration.
pub mod config;

/// Local gateway connector.
pub mod direct;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Correlation ids and bridge tokens.
pub mod identifiers;

/// Relay message types.
pub mod protocol;

/// Normalized ledger records.
pub mod records;

/// Per-session context.
pub mod session;

/// Source resolution and fallback.
pub mod source;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{BridgeAgent, BridgeClient, ConnectionState, ReconnectPolicy};

// Configuration types
pub use config::{BridgeOptions, Environment, LinkConfig, LinkConfigBuilder};

// Direct connector types
pub use direct::{ConnectionStatus, DirectConnector};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{BridgeToken, CorrelationId};

// Record types
pub use records::{Company, Ledger, StockItem, Voucher};

// Session types
pub use session::{LedgerLink, LedgerLinkBuilder};

// Source types
pub use source::{ConnectionSettings, DataSource, FetchOutcome, SourceResolver, SourceSelection};

//! Session context.
//!
//! A [`LedgerLink`] owns everything one consumer session needs: its
//! configuration, connection settings, the relay client, the gateway
//! connector and the source resolver. There is no process-wide instance.
//!
//! # Example
//!
//! ```no_run
//! use ledger_link::{LedgerLink, LinkConfig, SourceSelection};
//!
//! # async fn example() -> ledger_link::Result<()> {
//! let link = LedgerLink::builder()
//!     .config(LinkConfig::builder().api_base("https://api.example.com/api").build()?)
//!     .build()?;
//!
//! let outcome = link.fetch("ceo", "Acme Corp", SourceSelection::Auto).await;
//! match outcome.error {
//!     None => println!("{:?} from {:?}", outcome.data, outcome.source),
//!     Some(message) => eprintln!("unavailable: {message}"),
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::bridge::{BridgeAgent, BridgeClient};
use crate::config::LinkConfig;
use crate::direct::{ConnectionStatus, DirectConnector};
use crate::error::{Error, Result};
use crate::source::{
    ConnectionSettings, DashboardTransport, FetchOutcome, SourceResolver, SourceSelection,
};

use super::builder::LedgerLinkBuilder;

// ============================================================================
// Types
// ============================================================================

struct LedgerLinkInner {
    config: LinkConfig,
    settings: Arc<ConnectionSettings>,
    bridge: BridgeClient,
    connector: DirectConnector,
    resolver: SourceResolver,
}

// ============================================================================
// LedgerLink
// ============================================================================

/// Per-session entry point.
///
/// Cloning is cheap; clones share the same bridge channel and settings.
#[derive(Clone)]
pub struct LedgerLink {
    inner: Arc<LedgerLinkInner>,
}

impl LedgerLink {
    /// Creates a new session builder.
    #[inline]
    #[must_use]
    pub fn builder() -> LedgerLinkBuilder {
        LedgerLinkBuilder::new()
    }

    pub(crate) fn new(config: LinkConfig, transport: Arc<dyn DashboardTransport>) -> Result<Self> {
        let settings = Arc::new(ConnectionSettings::new(
            config.connection_type,
            config.bridge_token.clone(),
        ));
        let connector = DirectConnector::new(config.gateway_url.as_str())?;
        let bridge = BridgeClient::from_config(&config);
        let resolver = SourceResolver::new(transport, Arc::clone(&settings));

        debug!(
            connection_type = %config.connection_type,
            gateway = %config.gateway_url,
            "Session created"
        );

        Ok(Self {
            inner: Arc::new(LedgerLinkInner {
                config,
                settings,
                bridge,
                connector,
                resolver,
            }),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// Connection type and bridge token, mutable at runtime.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Arc<ConnectionSettings> {
        &self.inner.settings
    }

    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &BridgeClient {
        &self.inner.bridge
    }

    #[inline]
    #[must_use]
    pub fn connector(&self) -> &DirectConnector {
        &self.inner.connector
    }

    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &SourceResolver {
        &self.inner.resolver
    }

    /// Connects the relay client with the stored bridge token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no token is stored, otherwise the error
    /// from [`BridgeClient::connect`].
    pub async fn connect_bridge(&self) -> Result<()> {
        let token = self
            .inner
            .settings
            .bridge_token()
            .ok_or_else(|| Error::config("no bridge token stored for this session"))?;
        self.inner.bridge.connect(token).await
    }

    /// Fetches dashboard data with fallback. See [`SourceResolver::fetch`].
    pub async fn fetch(
        &self,
        endpoint: &str,
        company: &str,
        selection: impl Into<SourceSelection>,
    ) -> FetchOutcome {
        self.inner.resolver.fetch(endpoint, company, selection).await
    }

    /// Probes the local gateway.
    pub async fn test_connection(&self) -> ConnectionStatus {
        self.inner.connector.test_connection().await
    }

    /// Agent serving relayed gateway calls over this session's bridge.
    #[must_use]
    pub fn agent(&self) -> BridgeAgent {
        BridgeAgent::new(self.inner.bridge.clone(), self.inner.connector.clone())
    }

    /// Closes the bridge and cancels its outstanding requests.
    pub fn shutdown(&self) {
        self.inner.bridge.shutdown();
    }
}

impl fmt::Debug for LedgerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerLink")
            .field("connection_type", &self.inner.settings.connection_type())
            .field("bridge_state", &self.inner.bridge.state())
            .field("gateway", &self.inner.connector.base_url().as_str())
            .finish_non_exhaustive()
    }
}

//! Builder for [`LedgerLink`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::source::{DashboardTransport, RestDashboardClient};

use super::core::LedgerLink;

// ============================================================================
// LedgerLinkBuilder
// ============================================================================

/// Builder for configuring a [`LedgerLink`].
///
/// Use [`LedgerLink::builder()`] to create one.
#[derive(Default)]
pub struct LedgerLinkBuilder {
    config: Option<LinkConfig>,
    transport: Option<Arc<dyn DashboardTransport>>,
}

impl LedgerLinkBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration. Defaults to [`LinkConfig::builder`] defaults.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the dashboard REST transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn DashboardTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither an API base nor a transport is set
    /// - [`Error::Http`] if an HTTP client cannot be built
    pub fn build(self) -> Result<LedgerLink> {
        let config = match self.config {
            Some(config) => config,
            None => LinkConfig::builder().build()?,
        };

        let transport = match (self.transport, &config.api_base) {
            (Some(transport), _) => transport,
            (None, Some(api_base)) => Arc::new(RestDashboardClient::new(api_base.clone())?),
            (None, None) => {
                return Err(Error::config(
                    "an API base is required for dashboard fetches. \
                     Use LinkConfig::builder().api_base(..) or LedgerLink::builder().transport(..)",
                ));
            }
        };

        LedgerLink::new(config, transport)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::bridge::ConnectionState;
    use crate::source::{DashboardRequest, DataSource, SourceSelection};

    struct FixedTransport(Value);

    #[async_trait]
    impl DashboardTransport for FixedTransport {
        async fn fetch(&self, _request: &DashboardRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_build_requires_api_base_or_transport() {
        let err = LedgerLink::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_from_config() -> anyhow::Result<()> {
        let config = LinkConfig::builder()
            .api_base("https://api.example.com/api")
            .connection_type(DataSource::Bridge)
            .bridge_token("tok")
            .build()?;

        let link = LedgerLink::builder().config(config).build()?;

        assert!(link.settings().is_bridge_mode());
        assert_eq!(link.bridge().state(), ConnectionState::Disconnected);
        assert_eq!(link.connector().base_url().as_str(), "http://localhost:9000/");
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_through_custom_transport() -> anyhow::Result<()> {
        let link = LedgerLink::builder()
            .transport(Arc::new(FixedTransport(json!({"data": {"kpis": {}}}))))
            .build()?;

        let outcome = link.fetch("ceo", "Acme", SourceSelection::Auto).await;
        assert_eq!(outcome.source, Some(DataSource::Live));
        assert_eq!(outcome.data, Some(json!({"kpis": {}})));
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_bridge_needs_token() -> anyhow::Result<()> {
        let link = LedgerLink::builder()
            .transport(Arc::new(FixedTransport(Value::Null)))
            .build()?;

        let err = tokio_test::assert_err!(link.connect_bridge().await);
        assert!(matches!(err, Error::Config { .. }));
        Ok(())
    }
}

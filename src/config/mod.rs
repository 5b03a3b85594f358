//! Configuration for a ledger-link session.
//!
//! Everything here is supplied externally: API base, optional WebSocket
//! override, gateway address, stored connection type and bridge token.
//!
//! # Example
//!
//! ```no_run
//! use ledger_link::{DataSource, LinkConfig};
//!
//! # fn example() -> ledger_link::Result<()> {
//! let config = LinkConfig::builder()
//!     .api_base("https://api.example.com/api")
//!     .connection_type(DataSource::Bridge)
//!     .bridge_token("3f9c...")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `LEDGER_API_BASE` | [`LinkConfig::api_base`] |
//! | `LEDGER_WS_URL` | [`LinkConfig::ws_url`] |
//! | `LEDGER_GATEWAY_URL` | [`LinkConfig::gateway_url`] |
//! | `LEDGER_CONNECTION_TYPE` | [`LinkConfig::connection_type`] |
//! | `LEDGER_BRIDGE_TOKEN` | [`LinkConfig::bridge_token`] |
//! | `LEDGER_ENV` | [`LinkConfig::environment`] |

// ============================================================================
// Submodules
// ============================================================================

/// Relay URL derivation.
pub mod endpoint;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::bridge::ReconnectPolicy;
use crate::direct::DEFAULT_GATEWAY_URL;
use crate::error::{Error, Result};
use crate::identifiers::BridgeToken;
use crate::source::DataSource;

pub use endpoint::RelayEndpoint;

// ============================================================================
// Constants
// ============================================================================

/// Relay base used in development when nothing else is configured.
pub const DEVELOPMENT_RELAY_BASE: &str = "ws://localhost:8000";

/// Relay base used in production when nothing else is configured.
pub const PRODUCTION_RELAY_BASE: &str = "wss://bridge.ledger-link.app";

/// Default wait for the channel to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default client keepalive period.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parses `development`/`dev` or `production`/`prod`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Relay base for this environment.
    #[must_use]
    pub const fn default_relay_base(self) -> &'static str {
        match self {
            Self::Development => DEVELOPMENT_RELAY_BASE,
            Self::Production => PRODUCTION_RELAY_BASE,
        }
    }
}

// ============================================================================
// BridgeOptions
// ============================================================================

/// Timing knobs for the bridge client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Deadline for the channel to open.
    pub connect_timeout: Duration,
    /// Default deadline for correlated requests.
    pub request_timeout: Duration,
    /// Automatic reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Client-initiated ping period; `None` disables it.
    pub keepalive_interval: Option<Duration>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }
}

// ============================================================================
// LinkConfig
// ============================================================================

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// REST API base (`…/dashboards/…` is appended).
    pub api_base: Option<Url>,
    /// Explicit relay base.
    pub ws_url: Option<Url>,
    /// Local gateway address.
    pub gateway_url: Url,
    /// Deployment environment.
    pub environment: Environment,
    /// Stored connection-type flag.
    pub connection_type: DataSource,
    /// Bridge session token.
    pub bridge_token: Option<BridgeToken>,
    /// Bridge client timing.
    pub bridge: BridgeOptions,
}

impl LinkConfig {
    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::default()
    }

    /// Loads configuration from `LEDGER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] for malformed values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] for malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(value) = get("LEDGER_API_BASE") {
            builder = builder.api_base(value);
        }
        if let Some(value) = get("LEDGER_WS_URL") {
            builder = builder.ws_url(value);
        }
        if let Some(value) = get("LEDGER_GATEWAY_URL") {
            builder = builder.gateway_url(value);
        }
        if let Some(value) = get("LEDGER_CONNECTION_TYPE") {
            let source = value.parse::<DataSource>()?;
            builder = builder.connection_type(source);
        }
        if let Some(value) = get("LEDGER_BRIDGE_TOKEN") {
            builder = builder.bridge_token(value);
        }
        if let Some(value) = get("LEDGER_ENV") {
            let environment = Environment::parse(&value).ok_or_else(|| {
                Error::config(format!(
                    "LEDGER_ENV must be development or production, got {value}"
                ))
            })?;
            builder = builder.environment(environment);
        }

        builder.build()
    }

    /// Relay endpoint inputs.
    #[must_use]
    pub fn relay_endpoint(&self) -> RelayEndpoint {
        RelayEndpoint {
            override_url: self.ws_url.clone(),
            api_base: self.api_base.clone(),
            environment: self.environment,
        }
    }
}

// ============================================================================
// LinkConfigBuilder
// ============================================================================

/// Fluent builder for [`LinkConfig`].
///
/// URLs are kept as strings until [`LinkConfigBuilder::build`] validates them.
#[derive(Debug, Clone, Default)]
pub struct LinkConfigBuilder {
    api_base: Option<String>,
    ws_url: Option<String>,
    gateway_url: Option<String>,
    environment: Environment,
    connection_type: DataSource,
    bridge_token: Option<BridgeToken>,
    bridge: BridgeOptions,
}

impl LinkConfigBuilder {
    /// Sets the REST API base.
    #[inline]
    #[must_use]
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    /// Sets the explicit relay base (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the local gateway address.
    #[inline]
    #[must_use]
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Sets the deployment environment.
    #[inline]
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the stored connection-type flag.
    #[inline]
    #[must_use]
    pub fn connection_type(mut self, source: DataSource) -> Self {
        self.connection_type = source;
        self
    }

    /// Sets the bridge session token.
    #[inline]
    #[must_use]
    pub fn bridge_token(mut self, token: impl Into<BridgeToken>) -> Self {
        self.bridge_token = Some(token.into());
        self
    }

    /// Replaces the bridge timing options.
    #[inline]
    #[must_use]
    pub fn bridge_options(mut self, options: BridgeOptions) -> Self {
        self.bridge = options;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if a URL does not parse
    /// - [`Error::Config`] if a URL has the wrong scheme or the token is blank
    pub fn build(self) -> Result<LinkConfig> {
        let api_base = self
            .api_base
            .as_deref()
            .map(|raw| parse_url(raw, &["http", "https"], "API base"))
            .transpose()?;
        let ws_url = self
            .ws_url
            .as_deref()
            .map(|raw| parse_url(raw, &["ws", "wss"], "WebSocket URL"))
            .transpose()?;
        let gateway_url = parse_url(
            self.gateway_url.as_deref().unwrap_or(DEFAULT_GATEWAY_URL),
            &["http", "https"],
            "gateway URL",
        )?;

        if let Some(token) = &self.bridge_token
            && token.is_blank()
        {
            return Err(Error::config("bridge token must not be blank"));
        }

        Ok(LinkConfig {
            api_base,
            ws_url,
            gateway_url,
            environment: self.environment,
            connection_type: self.connection_type,
            bridge_token: self.bridge_token,
            bridge: self.bridge,
        })
    }
}

fn parse_url(raw: &str, schemes: &[&str], what: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    if !schemes.contains(&url.scheme()) {
        return Err(Error::config(format!(
            "{what} must use one of {schemes:?}, got {}://",
            url.scheme()
        )));
    }
    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::builder().build().expect("config");
        assert_eq!(config.gateway_url.as_str(), "http://localhost:9000/");
        assert_eq!(config.connection_type, DataSource::Live);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bridge.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.bridge.request_timeout, Duration::from_secs(30));
        assert_eq!(config.bridge.reconnect.max_attempts, 5);
        assert!(config.api_base.is_none());
    }

    #[test]
    fn test_wrong_scheme_is_rejected() {
        let result = LinkConfig::builder().ws_url("https://relay.example.com").build();
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = LinkConfig::builder().api_base("ws://api.example.com").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_unparseable_url() {
        let result = LinkConfig::builder().gateway_url("not a url").build();
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[test]
    fn test_blank_token_is_rejected() {
        let result = LinkConfig::builder().bridge_token("   ").build();
        assert!(result.unwrap_err().to_string().contains("blank"));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LEDGER_API_BASE", "https://api.example.com/api"),
            ("LEDGER_CONNECTION_TYPE", "bridge"),
            ("LEDGER_BRIDGE_TOKEN", "tok"),
            ("LEDGER_ENV", "prod"),
            ("LEDGER_WS_URL", ""),
        ]);

        let config =
            LinkConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("config");

        assert_eq!(config.connection_type, DataSource::Bridge);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bridge_token, Some(BridgeToken::new("tok")));
        assert!(config.ws_url.is_none());

        let relay = config
            .relay_endpoint()
            .url_for(&BridgeToken::new("tok"))
            .expect("relay");
        assert_eq!(relay.as_str(), "wss://api.example.com/ws/tally-bridge/tok");
    }

    #[test]
    fn test_from_lookup_rejects_unknown_environment() {
        let result = LinkConfig::from_lookup(|key| (key == "LEDGER_ENV").then(|| "staging".into()));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("Production"), Some(Environment::Production));
        assert_eq!(Environment::parse("dev"), Some(Environment::Development));
        assert_eq!(Environment::parse("qa"), None);
    }
}

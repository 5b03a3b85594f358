//! Relay endpoint resolution.
//!
//! The relay URL for a token is `{base}/ws/tally-bridge/{token}` where the
//! base is, in order of precedence:
//!
//! 1. the explicit WebSocket override,
//! 2. the API base with its scheme mapped `http → ws`, `https → wss` and its
//!    path dropped,
//! 3. the environment default.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::BridgeToken;

use super::Environment;

// ============================================================================
// Constants
// ============================================================================

/// Path segments appended to the relay base.
const RELAY_PATH: [&str; 2] = ["ws", "tally-bridge"];

// ============================================================================
// RelayEndpoint
// ============================================================================

/// Inputs for deriving the relay URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    /// Explicit WebSocket base.
    pub override_url: Option<Url>,
    /// REST API base.
    pub api_base: Option<Url>,
    /// Deployment environment.
    pub environment: Environment,
}

impl RelayEndpoint {
    /// Returns the relay URL for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the chosen base has an unsupported scheme
    /// or cannot carry a path.
    pub fn url_for(&self, token: &BridgeToken) -> Result<Url> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|()| Error::config("relay URL cannot carry a path"))?
            .pop_if_empty()
            .extend(RELAY_PATH)
            .push(token.as_str());
        Ok(url)
    }

    /// Returns the base URL chosen by precedence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for schemes other than `ws`/`wss` on the
    /// override or `http`/`https` on the API base.
    pub fn base(&self) -> Result<Url> {
        if let Some(url) = &self.override_url {
            return match url.scheme() {
                "ws" | "wss" => Ok(url.clone()),
                other => Err(Error::config(format!(
                    "WebSocket override must use ws:// or wss://, got {other}://"
                ))),
            };
        }

        if let Some(api) = &self.api_base {
            let scheme = match api.scheme() {
                "https" => "wss",
                "http" => "ws",
                other => {
                    return Err(Error::config(format!(
                        "API base must use http:// or https://, got {other}://"
                    )));
                }
            };
            let mut url = api.clone();
            url.set_scheme(scheme)
                .map_err(|()| Error::config(format!("cannot derive relay URL from {api}")))?;
            url.set_path("/");
            url.set_query(None);
            url.set_fragment(None);
            return Ok(url);
        }

        Ok(Url::parse(self.environment.default_relay_base())?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Option<Url> {
        Some(Url::parse(s).expect("valid url"))
    }

    fn token() -> BridgeToken {
        BridgeToken::new("tok-123")
    }

    #[test]
    fn test_override_wins() {
        let endpoint = RelayEndpoint {
            override_url: url("wss://relay.example.com/prefix/"),
            api_base: url("https://api.example.com/api"),
            environment: Environment::Production,
        };
        assert_eq!(
            endpoint.url_for(&token()).expect("url").as_str(),
            "wss://relay.example.com/prefix/ws/tally-bridge/tok-123"
        );
    }

    #[test]
    fn test_derived_from_api_base() {
        let endpoint = RelayEndpoint {
            override_url: None,
            api_base: url("https://api.example.com:8443/api/v1?x=1"),
            environment: Environment::Development,
        };
        assert_eq!(
            endpoint.url_for(&token()).expect("url").as_str(),
            "wss://api.example.com:8443/ws/tally-bridge/tok-123"
        );

        let plain = RelayEndpoint {
            api_base: url("http://localhost:8000/api"),
            ..endpoint
        };
        assert_eq!(
            plain.url_for(&token()).expect("url").as_str(),
            "ws://localhost:8000/ws/tally-bridge/tok-123"
        );
    }

    #[test]
    fn test_environment_default() {
        let endpoint = RelayEndpoint {
            override_url: None,
            api_base: None,
            environment: Environment::Development,
        };
        assert_eq!(
            endpoint.url_for(&token()).expect("url").as_str(),
            "ws://localhost:8000/ws/tally-bridge/tok-123"
        );
    }

    #[test]
    fn test_token_is_percent_encoded() {
        let endpoint = RelayEndpoint {
            override_url: url("ws://127.0.0.1:9999"),
            api_base: None,
            environment: Environment::Development,
        };
        let relay = endpoint
            .url_for(&BridgeToken::new("a/b c"))
            .expect("url");
        assert_eq!(relay.path(), "/ws/tally-bridge/a%2Fb%20c");
    }

    #[test]
    fn test_bad_override_scheme() {
        let endpoint = RelayEndpoint {
            override_url: url("http://relay.example.com"),
            api_base: None,
            environment: Environment::Development,
        };
        assert!(matches!(
            endpoint.url_for(&token()),
            Err(Error::Config { .. })
        ));
    }
}

//! Dashboard REST transport.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::BridgeToken;

use super::DataSource;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for one dashboard call.
const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// DashboardRequest
// ============================================================================

/// One dashboard call against a concrete source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRequest {
    /// Dashboard type, e.g. `ceo` or `sales`.
    pub endpoint: String,
    pub company: String,
    pub source: DataSource,
    /// Bypass backend caches.
    pub refresh: bool,
    /// Sent only for [`DataSource::Bridge`].
    pub bridge_token: Option<BridgeToken>,
}

// ============================================================================
// DashboardTransport
// ============================================================================

/// Fetches raw dashboard bodies.
#[async_trait]
pub trait DashboardTransport: Send + Sync {
    /// Returns the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the backend is unreachable or
    /// answers with an error status, and [`Error::Json`] for undecodable
    /// bodies.
    async fn fetch(&self, request: &DashboardRequest) -> Result<Value>;
}

// ============================================================================
// RestDashboardClient
// ============================================================================

/// `reqwest` implementation of [`DashboardTransport`].
#[derive(Debug, Clone)]
pub struct RestDashboardClient {
    api_base: Url,
    http: reqwest::Client,
}

impl RestDashboardClient {
    /// Creates a client for the API rooted at `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `api_base` cannot carry a path, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(api_base: Url) -> Result<Self> {
        if api_base.cannot_be_a_base() {
            return Err(Error::config(format!("API base {api_base} cannot carry a path")));
        }
        let http = reqwest::Client::builder()
            .timeout(DASHBOARD_TIMEOUT)
            .build()?;
        Ok(Self { api_base, http })
    }

    /// Builds `{api}/dashboards/{type}/{company}?source=..&refresh=..`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API base cannot carry a path.
    pub fn url_for(&self, request: &DashboardRequest) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config("API base cannot carry a path"))?
            .pop_if_empty()
            .extend(["dashboards", request.endpoint.as_str(), request.company.as_str()]);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("source", request.source.as_str())
                .append_pair("refresh", if request.refresh { "true" } else { "false" });
            if request.source == DataSource::Bridge
                && let Some(token) = &request.bridge_token
            {
                query.append_pair("bridge_token", token.as_str());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl DashboardTransport for RestDashboardClient {
    async fn fetch(&self, request: &DashboardRequest) -> Result<Value> {
        let url = self.url_for(request)?;
        debug!(
            endpoint = %request.endpoint,
            company = %request.company,
            source = %request.source,
            "Fetching dashboard"
        );

        let response = self.http.get(url).send().await.map_err(|e| {
            warn!(error = %e, source = %request.source, "Dashboard request failed");
            Error::connection(format!("dashboard request failed: {e}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::connection(format!("dashboard response unreadable: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            warn!(%status, source = %request.source, "Dashboard returned error status");
            return Err(Error::connection(format!("HTTP {status}: {detail}")));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use httpmock::prelude::*;
    use serde_json::json;

    fn request(source: DataSource) -> DashboardRequest {
        DashboardRequest {
            endpoint: "ceo".into(),
            company: "Acme Corp".into(),
            source,
            refresh: false,
            bridge_token: Some(BridgeToken::new("tok")),
        }
    }

    fn acme(source: DataSource) -> DashboardRequest {
        DashboardRequest {
            company: "Acme".into(),
            ..request(source)
        }
    }

    fn client(base: &str) -> RestDashboardClient {
        RestDashboardClient::new(Url::parse(base).expect("url")).expect("client")
    }

    #[test]
    fn test_url_for() {
        let client = client("https://api.example.com/api");

        let live = client.url_for(&request(DataSource::Live)).expect("url");
        assert_eq!(
            live.as_str(),
            "https://api.example.com/api/dashboards/ceo/Acme%20Corp?source=live&refresh=false"
        );

        let bridge = client.url_for(&request(DataSource::Bridge)).expect("url");
        assert!(bridge.as_str().ends_with("?source=bridge&refresh=false&bridge_token=tok"));
    }

    #[tokio::test]
    async fn test_fetch_decodes_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/dashboards/ceo/Acme")
                .query_param("source", "bridge")
                .query_param("refresh", "false")
                .query_param("bridge_token", "tok");
            then.status(200).json_body(json!({"success": true, "data": {"kpis": {}}}));
        });

        let client = client(&format!("{}/api", server.base_url()));
        let body = client.fetch(&acme(DataSource::Bridge)).await.expect("body");

        assert_eq!(body["data"], json!({"kpis": {}}));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_status_carries_detail() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/dashboards/ceo/Acme");
            then.status(503).json_body(json!({"detail": "ledger offline"}));
        });

        let client = client(&server.base_url());
        let err = client.fetch(&acme(DataSource::Live)).await.unwrap_err();

        assert!(err.is_connection_error());
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("ledger offline"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_protocol_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/dashboards/ceo/Acme");
            then.status(200).body("<html>");
        });

        let client = client(&server.base_url());
        let err = client.fetch(&acme(DataSource::Backup)).await.unwrap_err();
        assert!(err.is_protocol_error());
    }
}

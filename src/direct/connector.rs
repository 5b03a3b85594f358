//! HTTP client for the ledger system's local XML gateway.
//!
//! Each call is one POST of a [`CollectionRequest`] envelope. Calls hold no
//! state between them apart from the pooled HTTP client.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::records::{Company, Ledger, StockItem, Voucher};

use super::envelope::{CollectionRequest, DateRange};
use super::parse;

// ============================================================================
// Constants
// ============================================================================

/// Default gateway address.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:9000";

/// Fixed per-call timeout.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bodies at or below this length count as "no real reply".
const MIN_HEALTHY_BODY_LEN: usize = 50;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Outcome of [`DirectConnector::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether the gateway answered with a non-trivial body.
    pub connected: bool,
    /// Human-readable explanation.
    pub message: String,
    /// Whether the browser-side CORS policy blocked the call.
    pub needs_proxy: bool,
}

// ============================================================================
// DirectConnector
// ============================================================================

/// Client for the gateway's Export/Collection protocol.
#[derive(Debug, Clone)]
pub struct DirectConnector {
    base_url: Url,
    http: reqwest::Client,
}

impl DirectConnector {
    /// Creates a connector for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `base_url` does not parse
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()?;

        Ok(Self { base_url, http })
    }

    /// Creates a connector for [`DEFAULT_GATEWAY_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_default_url() -> Result<Self> {
        Self::new(DEFAULT_GATEWAY_URL)
    }

    /// Returns the gateway base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Probes the gateway with a minimal company query.
    ///
    /// Never fails: transport errors are reported as `connected = false`.
    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.post_raw(&CollectionRequest::companies().to_xml()).await {
            Ok(body) if body.len() > MIN_HEALTHY_BODY_LEN => ConnectionStatus {
                connected: true,
                message: format!("Connected to ledger gateway at {}", self.base_url),
                needs_proxy: false,
            },
            Ok(body) => ConnectionStatus {
                connected: false,
                message: format!(
                    "Ledger gateway at {} answered with an empty reply ({} bytes)",
                    self.base_url,
                    body.len()
                ),
                needs_proxy: false,
            },
            Err(e) => ConnectionStatus {
                connected: false,
                needs_proxy: e.needs_proxy(),
                message: e.to_string(),
            },
        }
    }

    /// Lists the companies loaded in the gateway.
    pub async fn get_companies(&self) -> Result<Vec<Company>> {
        let body = self.export(&CollectionRequest::companies()).await?;
        parse::parse_companies(&body)
    }

    /// Lists the ledgers of `company`.
    pub async fn get_ledgers(&self, company: &str) -> Result<Vec<Ledger>> {
        let body = self.export(&CollectionRequest::ledgers(company)).await?;
        parse::parse_ledgers(&body)
    }

    /// Lists the vouchers of `company` between `from` and `to`.
    ///
    /// Missing bounds default to the 365 days ending today.
    pub async fn get_vouchers(
        &self,
        company: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Voucher>> {
        let body = self
            .export(&Self::voucher_request(company, from, to))
            .await?;
        parse::parse_vouchers(&body)
    }

    /// Lists the stock items of `company`.
    pub async fn get_stock_items(&self, company: &str) -> Result<Vec<StockItem>> {
        let body = self.export(&CollectionRequest::stock_items(company)).await?;
        parse::parse_stock_items(&body)
    }

    /// Builds the voucher request, filling in the default window.
    #[must_use]
    pub fn voucher_request(
        company: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> CollectionRequest {
        CollectionRequest::vouchers(company, DateRange::or_default(from, to))
    }

    /// Posts an arbitrary envelope and returns the raw body.
    ///
    /// # Errors
    ///
    /// - [`Error::CorsBlocked`] if a cross-origin policy rejected the call
    /// - [`Error::Connection`] for every other transport failure or a non-2xx status
    pub async fn post_raw(&self, xml: &str) -> Result<String> {
        let response = self
            .http
            .post(self.base_url.clone())
            .header(CONTENT_TYPE, "application/xml")
            .body(xml.to_string())
            .send()
            .await
            .map_err(|e| self.classify_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, url = %self.base_url, "Gateway returned error status");
            return Err(Error::connection(format!(
                "Ledger gateway at {} returned HTTP {status}",
                self.base_url
            )));
        }

        response.text().await.map_err(|e| self.classify_failure(&e))
    }

    async fn export(&self, request: &CollectionRequest) -> Result<String> {
        debug!(id = request.id, company = ?request.company, "Gateway export");
        let body = self.post_raw(&request.to_xml()).await?;
        debug!(id = request.id, bytes = body.len(), "Gateway export completed");
        Ok(body)
    }

    /// Maps a transport failure onto the error taxonomy.
    ///
    /// In a browser build the fetch layer reports cross-origin rejections as
    /// a bare "Failed to fetch", so that message is treated as CORS too.
    fn classify_failure(&self, err: &reqwest::Error) -> Error {
        self.classify_message(error_chain(err))
    }

    fn classify_message(&self, message: String) -> Error {
        let lowered = message.to_lowercase();

        if lowered.contains("cors") || lowered.contains("failed to fetch") {
            warn!(
                error = %message,
                url = %self.base_url,
                "Gateway call blocked by CORS policy"
            );
            return Error::cors_blocked(format!(
                "{message}. The gateway at {} must be reached through a proxy",
                self.base_url
            ));
        }

        warn!(error = %message, url = %self.base_url, "Gateway unreachable");
        let port = self
            .base_url
            .port_or_known_default()
            .map_or_else(|| "its configured".to_string(), |p| p.to_string());
        Error::connection(format!(
            "Cannot reach the ledger gateway at {} ({message}). \
             Verify the ledger system is running and its gateway is enabled on port {port}",
            self.base_url
        ))
    }
}

/// Joins an error and its sources into one message.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ============================================================================
// Tests
// ============================================================================

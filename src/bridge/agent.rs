//! Local end of the relay.
//!
//! A [`BridgeAgent`] runs next to the ledger system. It connects to the
//! relay, reports whether the gateway answers, and serves `tally_request`
//! messages by calling the gateway through a [`DirectConnector`].

// ============================================================================
// Imports
// ============================================================================

use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::direct::envelope::parse_compact_date;
use crate::direct::{ConnectionStatus, DirectConnector};
use crate::error::{Error, Result};
use crate::identifiers::BridgeToken;
use crate::protocol::tally::{raw_body, tally_failure, tally_success};
use crate::protocol::{LocalStatus, Message, TallyAction, kinds};

use super::BridgeClient;

// ============================================================================
// BridgeAgent
// ============================================================================

/// Serves relayed gateway calls.
#[derive(Clone)]
pub struct BridgeAgent {
    bridge: BridgeClient,
    connector: DirectConnector,
}

impl BridgeAgent {
    /// Creates an agent over an existing client and connector.
    #[must_use]
    pub fn new(bridge: BridgeClient, connector: DirectConnector) -> Self {
        Self { bridge, connector }
    }

    /// Returns the relay client.
    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &BridgeClient {
        &self.bridge
    }

    /// Probes the gateway and publishes the result as the local status.
    pub async fn refresh_status(&self) -> ConnectionStatus {
        let status = self.connector.test_connection().await;
        self.bridge.set_local_status(LocalStatus {
            tally_connected: status.connected,
            tally_url: self.connector.base_url().to_string(),
        });
        status
    }

    /// Refreshes the local status, installs the request handler, and connects.
    ///
    /// # Errors
    ///
    /// Returns the error from [`BridgeClient::connect`].
    pub async fn start(&self, token: impl Into<BridgeToken>) -> Result<()> {
        let status = self.refresh_status().await;
        debug!(gateway_connected = status.connected, "Starting bridge agent");

        let weak = self.bridge.downgrade();
        let connector = self.connector.clone();
        self.bridge.on_message(kinds::TALLY_REQUEST, move |request| {
            let weak = weak.clone();
            let connector = connector.clone();
            tokio::spawn(async move {
                let reply = serve(&connector, &request).await;
                let Some(bridge) = weak.upgrade() else {
                    return;
                };
                if !bridge.send(&reply) {
                    warn!(id = ?reply.id, "Bridge closed before tally_response was sent");
                }
            });
        });

        self.bridge.connect(token).await
    }

    /// Removes the handler and disconnects.
    pub fn stop(&self) {
        self.bridge.off_message(kinds::TALLY_REQUEST);
        self.bridge.disconnect();
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// Answers one `tally_request`.
///
/// Failures are reported in the response, never dropped.
pub async fn serve(connector: &DirectConnector, request: &Message) -> Message {
    let result = match TallyAction::from_message(request) {
        Ok(action) => {
            debug!(id = ?request.id, action = action.name(), "Serving tally_request");
            execute(connector, action).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => tally_success(request, data),
        Err(e) => {
            warn!(id = ?request.id, error = %e, "tally_request failed");
            tally_failure(request, &e)
        }
    }
}

async fn execute(connector: &DirectConnector, action: TallyAction) -> Result<Value> {
    let data = match action {
        TallyAction::TestConnection => {
            let status = connector.test_connection().await;
            json!({
                "connected": status.connected,
                "message": status.message,
                "needs_proxy": status.needs_proxy,
            })
        }
        TallyAction::Companies => serde_json::to_value(connector.get_companies().await?)?,
        TallyAction::Ledgers { company } => {
            serde_json::to_value(connector.get_ledgers(&company).await?)?
        }
        TallyAction::Vouchers {
            company,
            from_date,
            to_date,
        } => {
            let from = date_field("from_date", from_date.as_deref())?;
            let to = date_field("to_date", to_date.as_deref())?;
            serde_json::to_value(connector.get_vouchers(&company, from, to).await?)?
        }
        TallyAction::StockItems { company } => {
            serde_json::to_value(connector.get_stock_items(&company).await?)?
        }
        TallyAction::Raw { xml } => raw_body(connector.post_raw(&xml).await?),
    };
    Ok(data)
}

fn date_field(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_compact_date(text)
            .map(Some)
            .ok_or_else(|| Error::protocol(format!("{field} must be YYYYMMDD, got {text:?}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Relayed gateway calls (`tally_request` / `tally_response`).
//!
//! The relay forwards a gateway call to the machine running the ledger
//! system. The request names an action:
//!
//! | `action` | Fields | Result `data` |
//! |----------|--------|---------------|
//! | `test_connection` | - | `{connected, message, needs_proxy}` |
//! | `companies` | - | `Company[]` |
//! | `ledgers` | `company` | `Ledger[]` |
//! | `vouchers` | `company`, `from_date?`, `to_date?` (`YYYYMMDD`) | `Voucher[]` |
//! | `stock_items` | `company` | `StockItem[]` |
//! | `raw` | `xml` | `{xml}` (gateway body verbatim) |
//!
//! Fields are read from the top level of the message, or from a nested
//! `payload` object when the relay wraps them.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Error, Result};

use super::message::{Message, kinds};

// ============================================================================
// TallyAction
// ============================================================================

/// A gateway call requested over the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TallyAction {
    /// Probe the gateway.
    TestConnection,
    /// List companies.
    Companies,
    /// List ledgers of a company.
    Ledgers { company: String },
    /// List vouchers of a company.
    Vouchers {
        company: String,
        #[serde(default)]
        from_date: Option<String>,
        #[serde(default)]
        to_date: Option<String>,
    },
    /// List stock items of a company.
    StockItems { company: String },
    /// Forward an envelope verbatim.
    Raw { xml: String },
}

impl TallyAction {
    /// Extracts the action from a `tally_request` message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the message is not a `tally_request` or
    /// its fields do not describe a known action.
    pub fn from_message(message: &Message) -> Result<Self> {
        if !message.is(kinds::TALLY_REQUEST) {
            return Err(Error::protocol(format!(
                "expected {}, got {}",
                kinds::TALLY_REQUEST,
                message.kind
            )));
        }

        let fields = message
            .payload
            .get("payload")
            .and_then(Value::as_object)
            .unwrap_or(&message.payload);

        serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|e| Error::protocol(format!("invalid tally_request: {e}")))
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TestConnection => "test_connection",
            Self::Companies => "companies",
            Self::Ledgers { .. } => "ledgers",
            Self::Vouchers { .. } => "vouchers",
            Self::StockItems { .. } => "stock_items",
            Self::Raw { .. } => "raw",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Successful `tally_response` echoing the request id.
#[must_use]
pub fn tally_success(request: &Message, data: Value) -> Message {
    request
        .reply(kinds::TALLY_RESPONSE)
        .with_field("success", true)
        .with_field("data", data)
}

/// Failed `tally_response` echoing the request id.
#[must_use]
pub fn tally_failure(request: &Message, error: &Error) -> Message {
    request
        .reply(kinds::TALLY_RESPONSE)
        .with_field("success", false)
        .with_field("error", error.to_string())
        .with_field("needs_proxy", error.needs_proxy())
}

/// Wraps a raw gateway body.
#[must_use]
pub fn raw_body(xml: String) -> Value {
    json!({ "xml": xml })
}

// ============================================================================
// Tests
// ============================================================================

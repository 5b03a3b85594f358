//! Dashboard envelope adapter.
//!
//! The backend answers dashboard calls in two shapes:
//!
//! ```text
//! { "success": true, "source": "bridge", "data": { ...dashboard... } }
//! { "dashboard_type": "ceo", "revenue": ..., "_autoFallback": true }
//! ```
//!
//! [`normalize`] accepts both and nothing else.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use super::DataSource;

// ============================================================================
// Constants
// ============================================================================

/// Top-level keys that identify a bare dashboard payload.
const DASHBOARD_MARKERS: [&str; 10] = [
    "dashboard_type",
    "_autoFallback",
    "summary",
    "kpis",
    "revenue",
    "expenses",
    "net_profit",
    "cash_flow",
    "receivables",
    "payables",
];

// ============================================================================
// NormalizedPayload
// ============================================================================

/// Dashboard data with the source the backend reported, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    pub data: Value,
    pub reported_source: Option<DataSource>,
}

/// Extracts dashboard data from a raw response body.
///
/// A nested non-array `data` object wins, with `source` read from the same
/// envelope. Otherwise an object carrying any known dashboard marker is the
/// data itself, and `_autoFallback: true` marks it as backup. Anything else
/// yields `None`.
#[must_use]
pub fn normalize(raw: &Value) -> Option<NormalizedPayload> {
    let envelope = raw.as_object()?;

    if let Some(data @ Value::Object(_)) = envelope.get("data") {
        return Some(NormalizedPayload {
            data: data.clone(),
            reported_source: reported_source(envelope),
        });
    }

    if DASHBOARD_MARKERS.iter().any(|key| envelope.contains_key(*key)) {
        let auto_fallback = envelope
            .get("_autoFallback")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        return Some(NormalizedPayload {
            data: raw.clone(),
            reported_source: if auto_fallback {
                Some(DataSource::Backup)
            } else {
                reported_source(envelope)
            },
        });
    }

    None
}

/// Returns the backend's message when the body reports `success: false`.
#[must_use]
pub fn failure_message(raw: &Value) -> Option<String> {
    let envelope = raw.as_object()?;
    if envelope.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }

    let message = ["error", "message", "detail"]
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))
        .unwrap_or("backend reported failure");
    Some(message.to_string())
}

fn reported_source(envelope: &Map<String, Value>) -> Option<DataSource> {
    envelope
        .get("source")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

// ============================================================================
// Tests
// ============================================================================

//! Error types for the ledger connectivity layer.
//!
//! Every transport classifies its failures into one of these variants before
//! they leave the transport. The source resolver is the only consumer-facing
//! boundary, and it turns errors into failure outcomes instead of returning
//! them.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::CorsBlocked`] |
//! | Requests | [`Error::RequestTimeout`], [`Error::RequestCancelled`] |
//! | Protocol | [`Error::Protocol`], [`Error::Xml`], [`Error::Json`] |
//! | Resolution | [`Error::SourceUnavailable`] |
//! | External | [`Error::Http`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;
use crate::source::DataSource;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a URL, token or option is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport unreachable or abnormally closed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// No open event within the connect deadline.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The bridge channel is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Cross-origin policy rejected the gateway call.
    ///
    /// Remediation differs from a connectivity failure: the gateway has to be
    /// reached through a proxy.
    #[error("Request blocked by CORS policy: {message}")]
    CorsBlocked {
        /// Description of the rejection.
        message: String,
        /// Whether routing through a proxy is expected to help.
        needs_proxy: bool,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No correlated response arrived before the deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request that timed out.
        request_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The request was cancelled by a bridge shutdown.
    #[error("Request {request_id} cancelled")]
    RequestCancelled {
        /// The cancelled request.
        request_id: CorrelationId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unexpected payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// Both the primary and the backup source failed.
    #[error("{primary} source failed ({primary_error}); backup failed ({backup_error})")]
    SourceUnavailable {
        /// Source attempted first.
        primary: DataSource,
        /// Failure message from the primary attempt.
        primary_error: String,
        /// Failure message from the backup attempt.
        backup_error: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parse error.
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a CORS rejection error that suggests a proxy.
    #[inline]
    pub fn cors_blocked(message: impl Into<String>) -> Self {
        Self::CorsBlocked {
            message: message.into(),
            needs_proxy: true,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a request cancelled error.
    #[inline]
    pub fn request_cancelled(request_id: CorrelationId) -> Self {
        Self::RequestCancelled { request_id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a source-unavailable error.
    #[inline]
    pub fn source_unavailable(
        primary: DataSource,
        primary_error: impl Into<String>,
        backup_error: impl Into<String>,
    ) -> Self {
        Self::SourceUnavailable {
            primary,
            primary_error: primary_error.into(),
            backup_error: backup_error.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::CorsBlocked { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the payload could not be understood.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Xml(_) | Self::Json(_))
    }

    /// Returns `true` if reaching the gateway requires a proxy.
    #[inline]
    #[must_use]
    pub fn needs_proxy(&self) -> bool {
        matches!(
            self,
            Self::CorsBlocked {
                needs_proxy: true,
                ..
            }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

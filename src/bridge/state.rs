//! Bridge connection lifecycle.
//!
//! ```text
//!                connect()                 open
//! Disconnected ───────────► Connecting ───────────► Connected
//!      ▲                        │  ▲                   │
//!      │ open failed,           │  │ delay elapsed     │ abnormal close,
//!      │ attempts exhausted     │  │                   │ attempts left
//!      │ or disconnect()        ▼  │                   ▼
//!      └──────────────────── Reconnecting ◄────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the bridge channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No channel and no reconnect pending.
    #[default]
    Disconnected,
    /// Opening a channel.
    Connecting,
    /// Channel open and handshake queued.
    Connected,
    /// Waiting to retry after an abnormal close.
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

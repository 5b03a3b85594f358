//! Source selection and the two-tier fallback chain.
//!
//! ```text
//! Idle ─► Requesting(primary) ─┬─► Done(primary)
//!                              └─► Requesting(backup) ─┬─► Done(backup)
//!                                                      └─► Done(error)
//! ```
//!
//! The chain is never longer than two attempts, and a primary of `backup` is
//! not retried.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::normalize::{NormalizedPayload, failure_message, normalize};
use super::rest::{DashboardRequest, DashboardTransport};
use super::{ConnectionSettings, DataSource, SourceSelection};

// ============================================================================
// FetchOutcome
// ============================================================================

/// Result of a dashboard fetch.
///
/// Either `data` and `source` are set, or `error` is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub data: Option<Value>,
    pub source: Option<DataSource>,
    /// Served by the relay.
    #[serde(rename = "_fromBridge")]
    pub from_bridge: bool,
    /// Served by the uploaded snapshot.
    #[serde(rename = "_fromBackup")]
    pub from_backup: bool,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn success(payload: NormalizedPayload, attempted: DataSource, via_fallback: bool) -> Self {
        let source = payload.reported_source.unwrap_or(attempted);
        Self {
            data: Some(payload.data),
            source: Some(source),
            from_bridge: attempted == DataSource::Bridge && source != DataSource::Backup,
            from_backup: via_fallback || source == DataSource::Backup,
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            data: None,
            source: None,
            from_bridge: false,
            from_backup: false,
            error: Some(message),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

// ============================================================================
// SourceResolver
// ============================================================================

/// Picks a source per request and degrades to backup on failure.
#[derive(Clone)]
pub struct SourceResolver {
    transport: Arc<dyn DashboardTransport>,
    settings: Arc<ConnectionSettings>,
}

impl SourceResolver {
    #[must_use]
    pub fn new(transport: Arc<dyn DashboardTransport>, settings: Arc<ConnectionSettings>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Arc<ConnectionSettings> {
        &self.settings
    }

    /// Maps `auto` onto the stored connection type.
    #[must_use]
    pub fn resolve_source(&self, selection: SourceSelection) -> DataSource {
        match selection {
            SourceSelection::Explicit(source) => source,
            SourceSelection::Auto if self.settings.is_bridge_mode() => DataSource::Bridge,
            SourceSelection::Auto => DataSource::Live,
        }
    }

    /// Fetches a dashboard without bypassing caches.
    pub async fn fetch(
        &self,
        endpoint: &str,
        company: &str,
        selection: impl Into<SourceSelection>,
    ) -> FetchOutcome {
        self.fetch_with_refresh(endpoint, company, selection, false)
            .await
    }

    /// Fetches a dashboard, retrying once against backup.
    ///
    /// Never fails: a total failure is an outcome with `error` set.
    pub async fn fetch_with_refresh(
        &self,
        endpoint: &str,
        company: &str,
        selection: impl Into<SourceSelection>,
        refresh: bool,
    ) -> FetchOutcome {
        let primary = self.resolve_source(selection.into());

        let primary_error = match self.attempt(endpoint, company, primary, refresh).await {
            Ok(payload) => {
                debug!(%endpoint, source = %primary, "Dashboard resolved");
                return FetchOutcome::success(payload, primary, false);
            }
            Err(e) if primary == DataSource::Backup => {
                warn!(%endpoint, error = %e, "Backup source failed");
                return FetchOutcome::failure(e.to_string());
            }
            Err(e) => e,
        };

        info!(
            %endpoint,
            source = %primary,
            error = %primary_error,
            "Primary source failed, falling back to backup"
        );

        match self
            .attempt(endpoint, company, DataSource::Backup, refresh)
            .await
        {
            Ok(payload) => FetchOutcome::success(payload, DataSource::Backup, true),
            Err(backup_error) => {
                let error = Error::source_unavailable(
                    primary,
                    primary_error.to_string(),
                    backup_error.to_string(),
                );
                warn!(%endpoint, %error, "Dashboard unavailable");
                FetchOutcome::failure(error.to_string())
            }
        }
    }

    /// Runs one attempt against `source`.
    async fn attempt(
        &self,
        endpoint: &str,
        company: &str,
        source: DataSource,
        refresh: bool,
    ) -> Result<NormalizedPayload> {
        let bridge_token = match source {
            DataSource::Bridge => Some(
                self.settings
                    .bridge_token()
                    .ok_or_else(|| Error::config("bridge source requires a bridge token"))?,
            ),
            DataSource::Live | DataSource::Backup => None,
        };

        let request = DashboardRequest {
            endpoint: endpoint.to_string(),
            company: company.to_string(),
            source,
            refresh,
            bridge_token,
        };
        let raw = self.transport.fetch(&request).await?;

        if let Some(message) = failure_message(&raw) {
            return Err(Error::connection(message));
        }

        normalize(&raw).ok_or_else(|| {
            Error::protocol(format!("unrecognized dashboard response from {source} source"))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rustc_hash::FxHashMap;
    use serde_json::json;

    use crate::identifiers::BridgeToken;

    /// Answers per source and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: FxHashMap<DataSource, std::result::Result<Value, String>>,
        calls: Mutex<Vec<DashboardRequest>>,
    }

    impl ScriptedTransport {
        fn reply(mut self, source: DataSource, body: Value) -> Self {
            self.replies.insert(source, Ok(body));
            self
        }

        fn fail(mut self, source: DataSource, message: &str) -> Self {
            self.replies.insert(source, Err(message.to_string()));
            self
        }

        fn sources(&self) -> Vec<DataSource> {
            self.calls.lock().iter().map(|r| r.source).collect()
        }
    }

    #[async_trait]
    impl DashboardTransport for ScriptedTransport {
        async fn fetch(&self, request: &DashboardRequest) -> Result<Value> {
            self.calls.lock().push(request.clone());
            match self.replies.get(&request.source) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(message)) => Err(Error::connection(message.clone())),
                None => Err(Error::connection("no reply scripted")),
            }
        }
    }

    fn resolver(
        transport: ScriptedTransport,
        settings: ConnectionSettings,
    ) -> (SourceResolver, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let resolver = SourceResolver::new(transport.clone(), Arc::new(settings));
        (resolver, transport)
    }

    fn bridge_settings() -> ConnectionSettings {
        ConnectionSettings::new(DataSource::Bridge, Some(BridgeToken::new("tok")))
    }

    #[test]
    fn test_resolve_source() {
        let (live, _) = resolver(ScriptedTransport::default(), ConnectionSettings::default());
        assert_eq!(live.resolve_source(SourceSelection::Auto), DataSource::Live);

        let (bridge, _) = resolver(ScriptedTransport::default(), bridge_settings());
        assert_eq!(bridge.resolve_source(SourceSelection::Auto), DataSource::Bridge);
        assert_eq!(
            bridge.resolve_source(DataSource::Backup.into()),
            DataSource::Backup
        );
    }

    #[tokio::test]
    async fn test_live_success() {
        let transport = ScriptedTransport::default()
            .reply(DataSource::Live, json!({"success": true, "data": {"kpis": {}}}));
        let (resolver, transport) = resolver(transport, ConnectionSettings::default());

        let outcome = resolver.fetch("ceo", "Acme", SourceSelection::Auto).await;

        assert_eq!(outcome.data, Some(json!({"kpis": {}})));
        assert_eq!(outcome.source, Some(DataSource::Live));
        assert!(!outcome.from_bridge);
        assert!(!outcome.from_backup);
        assert_eq!(transport.sources(), vec![DataSource::Live]);
    }

    #[tokio::test]
    async fn test_auto_bridge_tags_and_sends_token() {
        let transport = ScriptedTransport::default()
            .reply(DataSource::Bridge, json!({"dashboard_type": "ceo"}));
        let (resolver, transport) = resolver(transport, bridge_settings());

        let outcome = resolver.fetch("ceo", "Acme", SourceSelection::Auto).await;

        assert_eq!(outcome.source, Some(DataSource::Bridge));
        assert!(outcome.from_bridge);
        let calls = transport.calls.lock();
        assert_eq!(calls[0].bridge_token, Some(BridgeToken::new("tok")));
    }

    #[tokio::test]
    async fn test_bridge_failure_falls_back_once() {
        let transport = ScriptedTransport::default()
            .fail(DataSource::Bridge, "relay down")
            .reply(DataSource::Backup, json!({"success": true, "data": {"kpis": {}}}));
        let (resolver, transport) = resolver(transport, bridge_settings());

        let outcome = resolver.fetch("ceo", "Acme", SourceSelection::Auto).await;

        assert_eq!(outcome.source, Some(DataSource::Backup));
        assert!(outcome.from_backup);
        assert!(!outcome.from_bridge);
        assert!(outcome.error.is_none());
        assert_eq!(transport.sources(), vec![DataSource::Bridge, DataSource::Backup]);
        assert_eq!(transport.calls.lock()[1].bridge_token, None);
    }

    #[tokio::test]
    async fn test_success_false_triggers_fallback() {
        let transport = ScriptedTransport::default()
            .reply(DataSource::Live, json!({"success": false, "error": "ledger offline"}))
            .reply(DataSource::Backup, json!({"dashboard_type": "ceo", "_autoFallback": true}));
        let (resolver, _) = resolver(transport, ConnectionSettings::default());

        let outcome = resolver.fetch("ceo", "Acme", DataSource::Live).await;
        assert_eq!(outcome.source, Some(DataSource::Backup));
        assert!(outcome.from_backup);
    }

    #[tokio::test]
    async fn test_unrecognized_shape_triggers_fallback() {
        let transport = ScriptedTransport::default()
            .reply(DataSource::Live, json!({"unexpected": 1}))
            .reply(DataSource::Backup, json!({"data": {"kpis": {}}}));
        let (resolver, transport) = resolver(transport, ConnectionSettings::default());

        let outcome = resolver.fetch("ceo", "Acme", DataSource::Live).await;
        assert!(outcome.is_success());
        assert_eq!(transport.sources().len(), 2);
    }

    #[tokio::test]
    async fn test_both_fail_returns_error_outcome() {
        let transport = ScriptedTransport::default()
            .fail(DataSource::Live, "refused")
            .fail(DataSource::Backup, "no snapshot");
        let (resolver, transport) = resolver(transport, ConnectionSettings::default());

        let outcome = resolver.fetch("ceo", "Acme", SourceSelection::Auto).await;

        assert!(outcome.data.is_none());
        assert!(outcome.source.is_none());
        let error = outcome.error.expect("error message");
        assert!(error.contains("refused"));
        assert!(error.contains("no snapshot"));
        assert_eq!(transport.sources().len(), 2);
    }

    #[tokio::test]
    async fn test_backup_primary_is_not_retried() {
        let transport = ScriptedTransport::default().fail(DataSource::Backup, "no snapshot");
        let (resolver, transport) = resolver(transport, ConnectionSettings::default());

        let outcome = resolver.fetch("ceo", "Acme", DataSource::Backup).await;

        assert!(outcome.error.expect("error").contains("no snapshot"));
        assert_eq!(transport.sources(), vec![DataSource::Backup]);
    }

    #[tokio::test]
    async fn test_bridge_without_token_falls_back() {
        let transport = ScriptedTransport::default()
            .reply(DataSource::Backup, json!({"data": {"kpis": {}}}));
        let settings = ConnectionSettings::new(DataSource::Bridge, None);
        let (resolver, transport) = resolver(transport, settings);

        let outcome = resolver.fetch("ceo", "Acme", SourceSelection::Auto).await;

        assert_eq!(outcome.source, Some(DataSource::Backup));
        assert_eq!(transport.sources(), vec![DataSource::Backup]);
    }

    #[test]
    fn test_outcome_serializes_tags() {
        let outcome = FetchOutcome::success(
            NormalizedPayload {
                data: json!({}),
                reported_source: None,
            },
            DataSource::Bridge,
            false,
        );
        let json = serde_json::to_value(&outcome).expect("json");
        assert_eq!(json["_fromBridge"], json!(true));
        assert_eq!(json["source"], json!("bridge"));
    }
}

// ABOUTME: RoostClient facade tying supervisor, dispatcher, and helpers together
// ABOUTME: The one entry point application shells talk to

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::config_writer::ConfigWriter;
use crate::diagnostics::{DiagnosticsReporter, DiagnosticsSnapshot};
use crate::dispatcher::{MethodCandidates, RpcDispatcher};
use crate::error::{GatewayError, Result};
use crate::models::{ChatMessage, GatewayEvent, GatewayStatus, RunRecord, SessionInfo};
use crate::session::{ResolvedSession, SessionResolver, SessionSelector};
use crate::supervisor::{ConnectionStatus, ConnectionSupervisor};
use crate::transport::{Connector, WsConnector};

/// Method names the run-history query has lived under, newest last.
const RUN_HISTORY_METHODS: [&str; 3] = ["cron.runs", "cron.jobs.runs", "scheduler.runs"];

/// The main roost gateway client.
///
/// Owns the single supervised connection; every application call-site
/// shares one `RoostClient` (it is cheap to share behind an `Arc`) so the
/// gateway's one-connection-per-device rule is honored process-wide.
pub struct RoostClient {
    supervisor: Arc<ConnectionSupervisor>,
    dispatcher: RpcDispatcher,
    resolver: SessionResolver,
    config_writer: ConfigWriter,
    diagnostics: DiagnosticsReporter,
}

impl RoostClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: GatewayConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.url.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a client from `ROOST_GATEWAY_URL` / `ROOST_GATEWAY_TOKEN`.
    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    /// Create a client over a custom connector. Tests inject in-memory
    /// transports here; production code wants `new`.
    pub fn with_connector(config: GatewayConfig, connector: Arc<dyn Connector>) -> Self {
        let supervisor = ConnectionSupervisor::new(config, connector);
        let dispatcher = RpcDispatcher::new(Arc::clone(&supervisor));
        Self {
            resolver: SessionResolver::new(dispatcher.clone()),
            config_writer: ConfigWriter::new(dispatcher.clone()),
            diagnostics: DiagnosticsReporter::new(Arc::clone(&supervisor)),
            dispatcher,
            supervisor,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        self.supervisor.config()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.supervisor.status()
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Ensure the gateway connection is up. Safe to call from every
    /// call-site; concurrent callers share one handshake.
    pub async fn connect(&self) -> Result<()> {
        self.supervisor.ensure_started().await
    }

    /// Probe the current connection without disturbing it.
    pub async fn check_liveness(&self) -> Result<()> {
        self.supervisor.check_liveness().await
    }

    /// Drop the current connection and dial a fresh one.
    pub async fn force_reconnect(&self) -> Result<()> {
        self.supervisor.force_reconnect().await
    }

    /// Permanently shut the client down.
    pub async fn close(&self) {
        self.supervisor.close().await
    }

    /// Connection diagnostics for status surfaces.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Subscribe to gateway push events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.supervisor.subscribe_events()
    }

    // =========================================================================
    // RPC surface
    // =========================================================================

    /// Raw escape hatch: call any gateway method, optionally with a
    /// fallback list of historical names.
    pub async fn call(
        &self,
        method: impl Into<MethodCandidates>,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.dispatcher.call(method, params, timeout).await
    }

    /// Resolve a session selector to a canonical key.
    pub async fn resolve_session(&self, selector: &SessionSelector) -> Result<ResolvedSession> {
        self.resolver.resolve(selector).await
    }

    /// Apply a raw config patch with an optimistic-concurrency precondition.
    pub async fn apply_config_patch(&self, raw_patch: &str) -> Result<Value> {
        self.config_writer.apply_patch(raw_patch).await
    }

    /// Send a chat message into a session. Returns the run id the gateway
    /// will tag the resulting agent events with.
    pub async fn send_chat(&self, session_key: &str, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(GatewayError::InvalidInput("chat message is empty".into()));
        }
        if session_key.trim().is_empty() {
            return Err(GatewayError::InvalidInput("session key is empty".into()));
        }

        let idempotency_key = format!("roost-{}", Uuid::new_v4());
        let payload = self
            .dispatcher
            .call(
                ["chat.send", "sessions.send"],
                json!({
                    "sessionKey": session_key,
                    "message": message,
                    "idempotencyKey": idempotency_key,
                }),
                None,
            )
            .await?;

        // Gateways echo the idempotency key back as the run id; older ones
        // omit it, in which case ours is authoritative anyway.
        Ok(payload
            .get("runId")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .unwrap_or(idempotency_key))
    }

    /// Fetch recent history for a session.
    pub async fn chat_history(&self, session_key: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        let payload = self
            .dispatcher
            .call(
                "chat.history",
                json!({ "sessionKey": session_key, "limit": limit }),
                None,
            )
            .await?;
        parse_list(payload, "messages")
    }

    /// List sessions known to the gateway.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let payload = self.dispatcher.call("sessions.list", json!({}), None).await?;
        parse_list(payload, "sessions")
    }

    /// List model names the gateway can serve.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let payload = self.dispatcher.call("models.list", json!({}), None).await?;
        parse_list(payload, "models")
    }

    /// Gateway self-reported status.
    pub async fn gateway_status(&self) -> Result<GatewayStatus> {
        let payload = self.dispatcher.call("status", json!({}), None).await?;
        serde_json::from_value(payload)
            .map_err(|e| GatewayError::Protocol(format!("bad status payload: {e}")))
    }

    /// Scheduled-run history. The query has been renamed across gateway
    /// versions, so this probes the historical names in order.
    pub async fn list_run_history(&self) -> Result<Vec<RunRecord>> {
        let payload = self
            .dispatcher
            .call(RUN_HISTORY_METHODS, json!({}), None)
            .await?;
        // Newer gateways answer with `runs`, the oldest with `jobs`.
        if payload.get("runs").is_some() {
            parse_list(payload, "runs")
        } else {
            parse_list(payload, "jobs")
        }
    }
}

/// Pull a typed list out of a payload field; a missing field is an empty
/// list, a malformed one is a protocol error.
fn parse_list<T: serde::de::DeserializeOwned>(mut payload: Value, field: &str) -> Result<Vec<T>> {
    match payload.get_mut(field) {
        Some(list) => serde_json::from_value(list.take())
            .map_err(|e| GatewayError::Protocol(format!("bad '{field}' payload: {e}"))),
        None => Ok(Vec::new()),
    }
}

// ABOUTME: Connection diagnostics snapshot for status surfaces
// ABOUTME: Endpoint masking that never leaks embedded credentials

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::supervisor::{ConnectionStatus, ConnectionSupervisor};

/// Marker exposed when an endpoint cannot be masked safely.
pub const ENDPOINT_UNAVAILABLE: &str = "Unavailable";

/// Read-only projection of connection state for status pages and health
/// checks. This shape is the stable external contract; the transport handle
/// and endpoint credentials never appear in it.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_disconnected_at_ms: Option<i64>,
    pub masked_endpoint: String,
    pub now_ms: i64,
}

/// Produces diagnostics snapshots from the supervisor's state.
pub struct DiagnosticsReporter {
    supervisor: Arc<ConnectionSupervisor>,
}

impl DiagnosticsReporter {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self { supervisor }
    }

    /// Current connection diagnostics.
    ///
    /// Kicks a best-effort `ensure_started` in the background so the report
    /// is informative even before first use, but never waits on it and never
    /// surfaces its failure here.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        if self.supervisor.status() == ConnectionStatus::Disconnected {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let supervisor = Arc::clone(&self.supervisor);
                handle.spawn(async move {
                    if let Err(e) = supervisor.ensure_started().await {
                        tracing::debug!(error = %e, "background connect from diagnostics failed");
                    }
                });
            }
        }

        DiagnosticsSnapshot {
            status: self.supervisor.status(),
            connected_since_ms: self.supervisor.connected_since_ms(),
            last_disconnected_at_ms: self.supervisor.last_disconnected_at_ms(),
            masked_endpoint: mask_endpoint(&self.supervisor.config().url),
            now_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Strip any credential/authority component from an endpoint address.
///
/// `ws://user:pass@host:port/path` becomes `ws://host:port/path`. Addresses
/// the url crate cannot parse get a best-effort scheme+host extraction, and
/// anything still unrecognizable masks to the explicit unavailable marker
/// instead of echoing the raw value.
pub fn mask_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ENDPOINT_UNAVAILABLE.to_string();
    }

    if let Ok(mut url) = Url::parse(trimmed) {
        if url.has_host() {
            // Setting userinfo can only fail for schemes that cannot carry
            // it, in which case there is nothing to strip.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            return url.to_string().trim_end_matches('/').to_string();
        }
    }

    // Best effort: keep scheme and whatever follows the last '@' in the
    // authority so credentials to the left of it are dropped.
    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
        let host = authority.rsplit('@').next().unwrap_or("");
        if !scheme.is_empty() && !host.is_empty() {
            return format!("{scheme}://{host}");
        }
    }

    ENDPOINT_UNAVAILABLE.to_string()
}

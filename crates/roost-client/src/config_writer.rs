// ABOUTME: Optimistic-concurrency configuration writes
// ABOUTME: Read-modify-write with a baseHash precondition when available

use serde_json::{json, Value};

use crate::dispatcher::RpcDispatcher;
use crate::error::{GatewayError, Result};

/// Applies partial configuration edits through the gateway.
///
/// Each patch is a read-modify-write: fetch the current config with its
/// integrity hash, then send the patch carrying that hash as a write
/// precondition. The gateway is the sole arbiter of conflicts; a stale-hash
/// rejection is surfaced verbatim so the caller can re-fetch and re-apply.
pub struct ConfigWriter {
    dispatcher: RpcDispatcher,
}

impl ConfigWriter {
    pub fn new(dispatcher: RpcDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Apply a raw config patch.
    ///
    /// Blank input is rejected locally, before any round-trip. A read step
    /// that yields no hash downgrades the write to unconditional rather
    /// than failing: older gateways predate the precondition protocol.
    pub async fn apply_patch(&self, raw_patch: &str) -> Result<Value> {
        if raw_patch.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "config patch is empty".into(),
            ));
        }

        let base_hash = match self.dispatcher.call("config.get", json!({}), None).await {
            Ok(snapshot) => snapshot
                .get("hash")
                .and_then(|h| h.as_str())
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            Err(e) => {
                tracing::warn!(error = %e, "config read failed, patching without precondition");
                None
            }
        };

        let mut params = json!({ "raw": raw_patch });
        if let Some(hash) = &base_hash {
            params["baseHash"] = json!(hash);
        }

        tracing::debug!(precondition = base_hash.is_some(), "applying config patch");
        self.dispatcher.call("config.patch", params, None).await
    }
}

// ABOUTME: Correlated RPC dispatch over the supervised gateway connection
// ABOUTME: Ordered fallback across renamed method names, typed try-next vs terminal errors

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::supervisor::ConnectionSupervisor;

/// An ordered list of method names to try for one logical operation.
///
/// The gateway's RPC surface has been renamed across versions; a call-site
/// that must work against any of them lists the candidates newest-first and
/// the dispatcher probes until one is recognized.
#[derive(Debug, Clone)]
pub struct MethodCandidates(Vec<String>);

impl MethodCandidates {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for MethodCandidates {
    fn from(method: &str) -> Self {
        MethodCandidates(vec![method.to_string()])
    }
}

impl From<String> for MethodCandidates {
    fn from(method: String) -> Self {
        MethodCandidates(vec![method])
    }
}

impl From<&[&str]> for MethodCandidates {
    fn from(methods: &[&str]) -> Self {
        MethodCandidates(methods.iter().map(|m| m.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for MethodCandidates {
    fn from(methods: [&str; N]) -> Self {
        MethodCandidates(methods.iter().map(|m| m.to_string()).collect())
    }
}

impl From<Vec<String>> for MethodCandidates {
    fn from(methods: Vec<String>) -> Self {
        MethodCandidates(methods)
    }
}

/// Issues request/response calls over the supervisor's current connection.
///
/// Stateless beyond the supervisor handle: every call re-resolves the
/// current connection, so a dispatcher clone held across a reconnect keeps
/// working against the replacement link.
#[derive(Clone)]
pub struct RpcDispatcher {
    supervisor: Arc<ConnectionSupervisor>,
}

impl RpcDispatcher {
    pub fn new(supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self { supervisor }
    }

    /// Call the gateway, trying each candidate method name in order.
    ///
    /// A "method not found" rejection moves on to the next candidate; any
    /// other failure (timeout, connection loss, domain rejection) is
    /// terminal and aborts the sequence as-is. When every candidate is
    /// unrecognized the last `MethodNotFound` is surfaced.
    pub async fn call(
        &self,
        method: impl Into<MethodCandidates>,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let candidates = method.into();
        if candidates.as_slice().is_empty() {
            return Err(GatewayError::InvalidInput(
                "no method name supplied".into(),
            ));
        }

        self.supervisor.ensure_started().await?;
        let timeout = timeout.unwrap_or(self.supervisor.config().call_timeout);

        let mut last_missing = None;
        for name in candidates.as_slice() {
            match self.supervisor.call_raw(name, params.clone(), timeout).await {
                Err(GatewayError::MethodNotFound(method)) => {
                    tracing::debug!(%method, "method not recognized, trying next candidate");
                    last_missing = Some(method);
                }
                other => return other,
            }
        }

        // Non-empty candidate list, so at least one rejection was recorded.
        Err(GatewayError::MethodNotFound(
            last_missing.unwrap_or_default(),
        ))
    }
}

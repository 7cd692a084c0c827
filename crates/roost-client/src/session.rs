// ABOUTME: Session key resolution for human-entered identifiers
// ABOUTME: Raw key wins, friendly lookup fails loudly, default is last resort

use serde_json::json;

use crate::dispatcher::RpcDispatcher;
use crate::error::{GatewayError, Result};

/// How a session key was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Raw,
    Friendly,
    Default,
}

impl ResolvedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedVia::Raw => "raw",
            ResolvedVia::Friendly => "friendly",
            ResolvedVia::Default => "default",
        }
    }
}

/// A resolved session key, never mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session_key: String,
    pub resolved_via: ResolvedVia,
}

/// Inputs to session resolution. Precedence is raw, then friendly, then
/// default: explicit identifiers always win over convenience lookups.
#[derive(Debug, Clone, Default)]
pub struct SessionSelector {
    /// Canonical key supplied directly by the caller; used verbatim.
    pub raw_key: Option<String>,
    /// Human-readable name resolved through the gateway.
    pub friendly_id: Option<String>,
    /// Fallback when neither identifier is given.
    pub default_key: String,
}

impl SessionSelector {
    pub fn with_default(default_key: impl Into<String>) -> Self {
        Self {
            raw_key: None,
            friendly_id: None,
            default_key: default_key.into(),
        }
    }

    pub fn raw(mut self, key: impl Into<String>) -> Self {
        self.raw_key = Some(key.into());
        self
    }

    pub fn friendly(mut self, id: impl Into<String>) -> Self {
        self.friendly_id = Some(id.into());
        self
    }
}

/// Resolves session selectors against the gateway.
pub struct SessionResolver {
    dispatcher: RpcDispatcher,
}

impl SessionResolver {
    pub fn new(dispatcher: RpcDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Resolve a selector to a canonical session key.
    ///
    /// A friendly id that resolves to nothing fails with a not-found
    /// rejection rather than degrading to the default; operating on the
    /// wrong session silently is the failure mode this guards against.
    pub async fn resolve(&self, selector: &SessionSelector) -> Result<ResolvedSession> {
        if let Some(raw) = non_empty(selector.raw_key.as_deref()) {
            return Ok(ResolvedSession {
                session_key: raw.to_string(),
                resolved_via: ResolvedVia::Raw,
            });
        }

        if let Some(friendly) = non_empty(selector.friendly_id.as_deref()) {
            let payload = self
                .dispatcher
                .call(
                    "sessions.resolve",
                    json!({
                        "key": friendly,
                        "includeGlobal": true,
                        "allowUnknown": false,
                    }),
                    None,
                )
                .await?;

            let key = payload
                .get("key")
                .and_then(|k| k.as_str())
                .map(str::trim)
                .unwrap_or_default();
            if key.is_empty() {
                return Err(GatewayError::Rejected {
                    code: "session_not_found".into(),
                    message: format!("no session matches '{friendly}'"),
                });
            }
            return Ok(ResolvedSession {
                session_key: key.to_string(),
                resolved_via: ResolvedVia::Friendly,
            });
        }

        Ok(ResolvedSession {
            session_key: selector.default_key.clone(),
            resolved_via: ResolvedVia::Default,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ABOUTME: Gateway connection configuration for roost-client
// ABOUTME: Builder-style config with env loading and secret-redacting Debug

use std::time::Duration;

/// Environment variable naming the gateway endpoint.
pub const ENV_GATEWAY_URL: &str = "ROOST_GATEWAY_URL";
/// Environment variable carrying the device token, if any.
pub const ENV_GATEWAY_TOKEN: &str = "ROOST_GATEWAY_TOKEN";
/// Default gateway endpoint when none is configured.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:18789";

/// Configuration for the gateway connection.
///
/// Timeouts are conservative fixed defaults; override them per deployment
/// rather than per call-site.
#[derive(Clone)]
pub struct GatewayConfig {
    /// WebSocket endpoint of the gateway (e.g., "ws://127.0.0.1:18789").
    /// May embed userinfo credentials; those never appear in logs or
    /// diagnostics output.
    pub url: String,
    /// Device token sent in the connect handshake.
    pub token: Option<String>,
    /// Timeout for the transport handshake (socket open through connect ack).
    pub connect_timeout: Duration,
    /// Default per-call timeout when the caller does not supply one.
    pub call_timeout: Duration,
    /// Timeout for the liveness probe.
    pub probe_timeout: Duration,
}

impl GatewayConfig {
    /// Create a config for the given endpoint with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// Load from the environment, falling back to the documented default
    /// endpoint when `ROOST_GATEWAY_URL` is unset or blank.
    pub fn from_env() -> Self {
        let url = std::env::var(ENV_GATEWAY_URL)
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let token = std::env::var(ENV_GATEWAY_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty());

        let mut config = Self::new(url);
        config.token = token;
        config
    }

    /// Set the device token for the connect handshake.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the liveness probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &crate::diagnostics::mask_endpoint(&self.url))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout", &self.connect_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new("ws://localhost:18789");
        assert_eq!(config.url, "ws://localhost:18789");
        assert!(config.token.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(15));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_new_trims_whitespace() {
        let config = GatewayConfig::new("  ws://gateway.internal:18789  ");
        assert_eq!(config.url, "ws://gateway.internal:18789");
    }

    #[test]
    fn test_builder_methods() {
        let config = GatewayConfig::new("ws://localhost:18789")
            .with_token("secret")
            .with_call_timeout(Duration::from_secs(3))
            .with_connect_timeout(Duration::from_secs(2))
            .with_probe_timeout(Duration::from_secs(1));

        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.probe_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_debug_redacts_token_and_userinfo() {
        let config =
            GatewayConfig::new("ws://device123:hunter2@gateway.internal:18789").with_token("tok");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"), "debug leaked password: {}", debug);
        assert!(!debug.contains("device123"), "debug leaked user: {}", debug);
        assert!(!debug.contains("tok\""), "debug leaked token: {}", debug);
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("gateway.internal"));
    }
}

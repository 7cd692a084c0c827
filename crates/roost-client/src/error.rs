// ABOUTME: Error types for roost-client
// ABOUTME: Discriminated call outcomes separating transient from terminal failures

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the gateway.
///
/// Callers get exactly one of these per call; raw transport errors never
/// leak through. `is_retryable()` separates "transient, retry may help"
/// from "will not change without different input".
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No live connection and establishment failed.
    #[error("gateway unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The call exceeded its deadline. The connection itself is left alone;
    /// a slow call is not evidence the connection is dead.
    #[error("call to '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// The connection was replaced or closed while the call was in flight.
    #[error("connection lost while call was in flight")]
    ConnectionLost,

    /// The gateway recognized none of the attempted method names.
    #[error("gateway does not recognize method '{0}'")]
    MethodNotFound(String),

    /// The gateway rejected the request at the domain level (precondition
    /// failed, session not found, invalid patch). Surfaced verbatim.
    #[error("gateway rejected request: {code}: {message}")]
    Rejected { code: String, message: String },

    /// Malformed caller input, rejected before any network I/O.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The gateway violated the wire protocol (unparseable frame, broken
    /// handshake sequence).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// True when retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionUnavailable(_)
                | GatewayError::Timeout { .. }
                | GatewayError::ConnectionLost
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings() {
        let err = GatewayError::ConnectionUnavailable("handshake refused".into());
        assert_eq!(err.to_string(), "gateway unavailable: handshake refused");

        let err = GatewayError::MethodNotFound("scheduler.runs".into());
        assert!(err.to_string().contains("scheduler.runs"));

        let err = GatewayError::Rejected {
            code: "precondition_failed".into(),
            message: "stale hash".into(),
        };
        assert_eq!(
            err.to_string(),
            "gateway rejected request: precondition_failed: stale hash"
        );
    }

    #[test]
    fn test_timeout_display_includes_method() {
        let err = GatewayError::Timeout {
            method: "chat.send".into(),
            timeout: Duration::from_secs(15),
        };
        assert!(err.to_string().contains("chat.send"));
    }

    #[test]
    fn test_retryable_split() {
        assert!(GatewayError::ConnectionUnavailable("x".into()).is_retryable());
        assert!(GatewayError::ConnectionLost.is_retryable());
        assert!(GatewayError::Timeout {
            method: "status".into(),
            timeout: Duration::from_secs(5),
        }
        .is_retryable());

        assert!(!GatewayError::MethodNotFound("x".into()).is_retryable());
        assert!(!GatewayError::Rejected {
            code: "not_found".into(),
            message: "no such session".into(),
        }
        .is_retryable());
        assert!(!GatewayError::InvalidInput("empty patch".into()).is_retryable());
        assert!(!GatewayError::Protocol("garbage frame".into()).is_retryable());
    }
}

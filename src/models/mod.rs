/*
 * Data models and types for the node connection service
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of the managed node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub connected: bool,
    pub network: String,
    pub status: ConnectionState,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReport {
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_gwei: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error("failed to connect to node at {url}: {reason}")]
    DialFailure { url: String, reason: String },

    #[error("connected to {url} but verification failed: {reason}")]
    VerificationFailure { url: String, reason: String },

    #[error("connection attempt already in progress")]
    AlreadyConnecting,

    #[error("node client not available: {0}")]
    NotConnected(#[source] Box<LinkError>),

    #[error("connection manager is closed")]
    Closed,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_by_name() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"Connected\"");
        assert_eq!(ConnectionState::Error.to_string(), "Error");
    }

    #[test]
    fn not_connected_keeps_cause() {
        let cause = LinkError::DialFailure {
            url: "http://node".to_string(),
            reason: "refused".to_string(),
        };
        let err = LinkError::NotConnected(Box::new(cause));
        assert_eq!(
            err.to_string(),
            "node client not available: failed to connect to node at http://node: refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}

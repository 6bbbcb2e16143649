/*
 * Node connection supervision: transport seam and the resilient manager
 */

mod manager;

use async_trait::async_trait;
use std::time::Duration;
use crate::models::Result;

pub use manager::ConnectionManager;

/// Opens clients against a node endpoint.
#[async_trait]
pub trait NodeDialer: Send + Sync + 'static {
    type Client: NodeClient;

    async fn dial(&self, url: &str) -> Result<Self::Client>;
}

/// A live client to a chain node.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Network/chain identifier reported by the node.
    async fn network_id(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    /// Releases the underlying transport. Calls made afterwards fail; a call
    /// already running finishes on the transport it started with.
    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Deadline shared by the dial and the verification call.
    pub connect_timeout: Duration,
    pub health_check_timeout: Duration,
    pub health_check_interval: Duration,
    /// Period of the check that re-arms a reconnect while no client is held.
    pub reconnect_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            health_check_timeout: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(30),
        }
    }
}

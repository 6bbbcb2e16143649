/*
 * Node service that route handlers use to reach the managed connection
 */

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};
use crate::{
    connection::{ConnectionManager, NodeClient, NodeDialer},
    models::{ConnectionState, LinkError, PingReport, Result, StatusReport},
    rpc::{EthersDialer, RpcClient},
};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Gas price lookup for clients that can provide one.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price_wei(&self) -> Result<u128>;
}

#[async_trait]
impl GasOracle for RpcClient {
    async fn gas_price_wei(&self) -> Result<u128> {
        let price = self.get_gas_price().await?;
        u128::try_from(price).map_err(|_| LinkError::Rpc(format!("gas price out of range: {price}")))
    }
}

pub struct NodeService<D: NodeDialer = EthersDialer> {
    manager: ConnectionManager<D>,
    network: String,
    chain_id: RwLock<Option<u64>>,
}

impl<D> NodeService<D>
where
    D: NodeDialer,
    D::Client: GasOracle,
{
    #[must_use]
    pub fn new(manager: ConnectionManager<D>, network: impl Into<String>) -> Self {
        Self {
            manager,
            network: network.into(),
            chain_id: RwLock::new(None),
        }
    }

    /// Connects once at startup. Failure is not fatal; the manager keeps retrying.
    pub async fn start(&self) {
        match self.manager.connect().await {
            Ok(()) => {
                self.remember_chain_id().await;
                info!(
                    network = %self.network,
                    chain_id = ?self.chain_id(),
                    "Node service initialized"
                );
            }
            Err(e) => {
                warn!(error = %e, "Node not connected at startup, will reconnect automatically");
            }
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        *self.chain_id.read()
    }

    #[must_use]
    pub fn status_report(&self) -> StatusReport {
        let (state, last_error) = self.manager.status();
        let connected = state == ConnectionState::Connected;
        StatusReport {
            connected,
            network: self.network.clone(),
            status: state,
            endpoint: self.manager.endpoint().to_string(),
            chain_id: if connected { self.chain_id() } else { None },
            error: last_error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Round-trips a block number query through the managed client.
    pub async fn ping(&self) -> PingReport {
        let started = Instant::now();
        let outcome = self.probe().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok((block_number, gas_price_wei)) => {
                #[allow(clippy::cast_precision_loss)]
                let gas_price_gwei = gas_price_wei as f64 / 1_000_000_000.0;
                PingReport {
                    connected: true,
                    latency_ms,
                    block_number: Some(block_number),
                    chain_id: self.chain_id(),
                    gas_price_wei: Some(gas_price_wei.to_string()),
                    gas_price_gwei: Some(gas_price_gwei),
                    error: None,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => PingReport {
                connected: false,
                latency_ms,
                block_number: None,
                chain_id: None,
                gas_price_wei: None,
                gas_price_gwei: None,
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        }
    }

    pub fn request_reconnect(&self) {
        info!("Reconnect requested by operator");
        self.manager.trigger_reconnect();
    }

    async fn probe(&self) -> Result<(u64, u128)> {
        let client = self.manager.client().await?;
        let block_number = time::timeout(PING_TIMEOUT, client.block_number())
            .await
            .map_err(|_| LinkError::Rpc(format!("block number request timed out after {PING_TIMEOUT:?}")))??;

        let gas_price_wei = match time::timeout(PING_TIMEOUT, client.gas_price_wei()).await {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                debug!(error = %e, "Gas price unavailable");
                0
            }
            Err(_) => 0,
        };

        if self.chain_id().is_none() {
            self.remember_chain_id().await;
        }
        Ok((block_number, gas_price_wei))
    }

    async fn remember_chain_id(&self) {
        let Ok(client) = self.manager.client().await else {
            return;
        };
        match client.network_id().await {
            Ok(id) => *self.chain_id.write() = Some(id),
            Err(e) => debug!(error = %e, "Could not read chain id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ManagerSettings;
    use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Node {
        down: AtomicBool,
        no_gas: AtomicBool,
    }

    struct NodeDial(Arc<Node>);

    struct NodeHandle(Arc<Node>);

    #[async_trait]
    impl NodeDialer for NodeDial {
        type Client = NodeHandle;

        async fn dial(&self, _url: &str) -> Result<NodeHandle> {
            if self.0.down.load(SeqCst) {
                return Err(LinkError::Rpc("connection refused".to_string()));
            }
            Ok(NodeHandle(Arc::clone(&self.0)))
        }
    }

    #[async_trait]
    impl NodeClient for NodeHandle {
        async fn network_id(&self) -> Result<u64> {
            Ok(84532)
        }

        async fn block_number(&self) -> Result<u64> {
            Ok(12_345)
        }

        fn close(&self) {}
    }

    #[async_trait]
    impl GasOracle for NodeHandle {
        async fn gas_price_wei(&self) -> Result<u128> {
            if self.0.no_gas.load(SeqCst) {
                return Err(LinkError::Rpc("gas oracle offline".to_string()));
            }
            Ok(1_500_000_000)
        }
    }

    fn service(node: &Arc<Node>) -> NodeService<NodeDial> {
        let manager = ConnectionManager::new(
            "http://node.test",
            NodeDial(Arc::clone(node)),
            ManagerSettings::default(),
        );
        NodeService::new(manager, "Base Sepolia")
    }

    #[tokio::test(start_paused = true)]
    async fn startup_failure_is_reported_not_fatal() {
        let node = Arc::new(Node::default());
        node.down.store(true, SeqCst);
        let service = service(&node);
        service.start().await;

        let report = service.status_report();
        assert!(!report.connected);
        assert_eq!(report.status, ConnectionState::Error);
        assert_eq!(report.endpoint, "http://node.test");
        assert!(report.chain_id.is_none());
        assert!(report.error.unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn status_carries_chain_id_once_connected() {
        let node = Arc::new(Node::default());
        let service = service(&node);
        service.start().await;

        let report = service.status_report();
        assert!(report.connected);
        assert_eq!(report.network, "Base Sepolia");
        assert_eq!(report.chain_id, Some(84532));
        assert!(report.error.is_none());

        service.manager.close();
        let report = service.status_report();
        assert_eq!(report.status, ConnectionState::Disconnected);
        assert!(report.chain_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ping_reports_block_and_gas() {
        let node = Arc::new(Node::default());
        let service = service(&node);

        let report = service.ping().await;
        assert!(report.connected);
        assert_eq!(report.block_number, Some(12_345));
        assert_eq!(report.chain_id, Some(84532));
        assert_eq!(report.gas_price_wei.as_deref(), Some("1500000000"));
        assert_eq!(report.gas_price_gwei, Some(1.5));
        service.manager.close();
    }

    #[tokio::test(start_paused = true)]
    async fn ping_tolerates_missing_gas_price() {
        let node = Arc::new(Node::default());
        node.no_gas.store(true, SeqCst);
        let service = service(&node);

        let report = service.ping().await;
        assert!(report.connected);
        assert_eq!(report.gas_price_wei.as_deref(), Some("0"));
        service.manager.close();
    }

    #[tokio::test(start_paused = true)]
    async fn ping_reports_unavailable_node() {
        let node = Arc::new(Node::default());
        node.down.store(true, SeqCst);
        let service = service(&node);

        let report = service.ping().await;
        assert!(!report.connected);
        assert!(report.block_number.is_none());
        assert!(report.error.unwrap().starts_with("node client not available"));
    }
}

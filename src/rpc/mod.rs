/*
 * RPC client module for talking to a chain node over HTTP or WebSocket
 */

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, Ws};
use ethers::types::U256;
use parking_lot::RwLock;
use std::sync::Arc;
use crate::connection::{NodeClient, NodeDialer};
use crate::models::{LinkError, Result};

// Picked from the endpoint scheme.
#[derive(Debug, Clone)]
enum NodeProvider {
    Http(Arc<Provider<Http>>),
    Ws(Arc<Provider<Ws>>),
}

/// Dials nodes with ethers providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthersDialer;

#[async_trait]
impl NodeDialer for EthersDialer {
    type Client = RpcClient;

    async fn dial(&self, url: &str) -> Result<RpcClient> {
        RpcClient::dial(url).await
    }
}

#[derive(Debug)]
pub struct RpcClient {
    // Taken on close so the transport goes with it.
    provider: RwLock<Option<NodeProvider>>,
}

impl RpcClient {
    /// WebSocket endpoints are connected here; HTTP endpoints are only parsed
    /// and see their first request on verification.
    pub async fn dial(rpc_url: &str) -> Result<Self> {
        let provider = if is_websocket(rpc_url) {
            let provider = Provider::<Ws>::connect(rpc_url)
                .await
                .map_err(|e| LinkError::Rpc(format!("Failed to open websocket: {e}")))?;
            NodeProvider::Ws(Arc::new(provider))
        } else {
            let provider = Provider::<Http>::try_from(rpc_url)
                .map_err(|e| LinkError::Rpc(format!("Failed to create provider: {e}")))?;
            NodeProvider::Http(Arc::new(provider))
        };

        Ok(Self {
            provider: RwLock::new(Some(provider)),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.provider.read().is_none()
    }

    pub async fn get_chain_id(&self) -> Result<u64> {
        let chain = match self.open_provider()? {
            NodeProvider::Http(provider) => chain_id(provider.as_ref()).await,
            NodeProvider::Ws(provider) => chain_id(provider.as_ref()).await,
        }?;
        u256_to_u64(chain, "chain ID")
    }

    pub async fn get_block_number(&self) -> Result<u64> {
        match self.open_provider()? {
            NodeProvider::Http(provider) => block_number(provider.as_ref()).await,
            NodeProvider::Ws(provider) => block_number(provider.as_ref()).await,
        }
    }

    pub async fn get_gas_price(&self) -> Result<U256> {
        match self.open_provider()? {
            NodeProvider::Http(provider) => gas_price(provider.as_ref()).await,
            NodeProvider::Ws(provider) => gas_price(provider.as_ref()).await,
        }
    }

    fn open_provider(&self) -> Result<NodeProvider> {
        self.provider
            .read()
            .clone()
            .ok_or_else(|| LinkError::Rpc("client closed".to_string()))
    }
}

#[async_trait]
impl NodeClient for RpcClient {
    async fn network_id(&self) -> Result<u64> {
        self.get_chain_id().await
    }

    async fn block_number(&self) -> Result<u64> {
        self.get_block_number().await
    }

    fn close(&self) {
        // A call already in flight holds its own provider handle until it returns.
        drop(self.provider.write().take());
    }
}

async fn chain_id<M: Middleware>(provider: &M) -> Result<U256> {
    provider
        .get_chainid()
        .await
        .map_err(|e| LinkError::Rpc(format!("Failed to get chain ID: {e}")))
}

async fn block_number<M: Middleware>(provider: &M) -> Result<u64> {
    let block = provider
        .get_block_number()
        .await
        .map_err(|e| LinkError::Rpc(format!("Failed to get block number: {e}")))?;
    Ok(block.as_u64())
}

async fn gas_price<M: Middleware>(provider: &M) -> Result<U256> {
    provider
        .get_gas_price()
        .await
        .map_err(|e| LinkError::Rpc(format!("Failed to get gas price: {e}")))
}

fn u256_to_u64(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(LinkError::Rpc(format!("{what} out of range: {value}")));
    }
    Ok(value.as_u64())
}

fn is_websocket(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    url.starts_with("ws://") || url.starts_with("wss://")
}

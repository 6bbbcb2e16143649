/*
 * nodelink - resilient chain-node connection service
 * Main entry point for the application
 */

use nodelink::{
    api::{self, ApiState},
    config::{Config, LogFormat, ServerConfig, DEFAULT_RPC_URL},
    rpc::EthersDialer,
    ConnectionManager, NodeService,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config.server);

    info!("Starting nodelink connection service");
    if config.node.rpc_url == DEFAULT_RPC_URL {
        warn!("BASE_TESTNET_RPC_URL not set, using default {}", DEFAULT_RPC_URL);
    }

    let manager = ConnectionManager::new(
        config.node.rpc_url.clone(),
        EthersDialer,
        config.node.manager_settings(),
    );
    let node_service = NodeService::new(manager.clone(), config.node.network_name.clone());
    node_service.start().await;

    info!("Starting API server on {}:{}", config.server.host, config.server.port);

    let figment = rocket::Config::figment()
        .merge(("address", config.server.host.clone()))
        .merge(("port", config.server.port));
    let rocket = api::create_rocket(ApiState { node_service }).configure(figment);
    let outcome = rocket.launch().await;

    manager.close();
    info!("nodelink stopped");
    outcome?;

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("nodelink={}", server.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    match server.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

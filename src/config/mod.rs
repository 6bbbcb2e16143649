/*
 * Configuration management for the nodelink service
 */

use crate::connection::ManagerSettings;
use crate::models::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://sepolia.base.org";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub node: NodeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub network_name: String,
    pub connect_timeout_secs: u64,
    pub health_check_timeout_secs: u64,
    pub health_check_interval_secs: u64,
    pub reconnect_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("BASE_TESTNET_RPC_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        let port = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|e| LinkError::Config(format!("Invalid port: {e}")))?;

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                log_format: lookup("LOG_FORMAT")
                    .unwrap_or_else(|| "text".to_string())
                    .parse()?,
            },
            node: NodeConfig {
                rpc_url,
                network_name: lookup("NETWORK_NAME").unwrap_or_else(|| "Base Sepolia".to_string()),
                connect_timeout_secs: seconds(&lookup, "RPC_CONNECT_TIMEOUT_SECS", 10)?,
                health_check_timeout_secs: seconds(&lookup, "RPC_HEALTH_TIMEOUT_SECS", 3)?,
                health_check_interval_secs: seconds(&lookup, "RPC_HEALTH_INTERVAL_SECS", 60)?,
                reconnect_interval_secs: seconds(&lookup, "RPC_RECONNECT_INTERVAL_SECS", 30)?,
            },
        })
    }
}

impl NodeConfig {
    #[must_use]
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs),
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
        }
    }
}

// Intervals feed tokio timers, which reject a zero period.
fn seconds<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|e| LinkError::Config(format!("Invalid {key}: {e}")))?;
    if value == 0 {
        return Err(LinkError::Config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}

impl std::str::FromStr for LogFormat {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LinkError::Config(format!("Unknown log format: {s}"))),
        }
    }
}

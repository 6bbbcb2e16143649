/*
 * nodelink - resilient chain-node connection service
 * Core library exports and module declarations
 */

pub mod api;
pub mod config;
pub mod connection;
pub mod models;
pub mod rpc;
pub mod service;

pub use config::Config;
pub use connection::{ConnectionManager, ManagerSettings, NodeClient, NodeDialer};
pub use models::*;
pub use service::NodeService;

/*
 * REST API module exposing the node connection to operators and the frontend
 */

use rocket::http::Status;
use rocket::serde::json::{json, Json, Value};
use rocket::{get, post, routes, State};
use crate::models::{PingReport, StatusReport};
use crate::service::NodeService;

pub struct ApiState {
    pub node_service: NodeService,
}

#[get("/api/blockchain/status")]
pub fn blockchain_status(state: &State<ApiState>) -> Json<StatusReport> {
    Json(state.node_service.status_report())
}

#[get("/api/network/ping")]
pub async fn ping_network(state: &State<ApiState>) -> Json<PingReport> {
    Json(state.node_service.ping().await)
}

#[post("/api/blockchain/reconnect")]
pub fn request_reconnect(state: &State<ApiState>) -> (Status, Json<Value>) {
    state.node_service.request_reconnect();
    (Status::Accepted, Json(json!({ "requested": true })))
}

#[must_use]
pub fn create_rocket(state: ApiState) -> rocket::Rocket<rocket::Build> {
    rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![health_check, blockchain_status, ping_network, request_reconnect],
        )
}

#[get("/health")]
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, ManagerSettings};
    use crate::rpc::EthersDialer;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use rocket::local::asynchronous::Client;

    async fn api_for(url: &str) -> Client {
        let manager = ConnectionManager::new(url, EthersDialer, ManagerSettings::default());
        let state = ApiState {
            node_service: NodeService::new(manager, "Base Sepolia"),
        };
        Client::tracked(create_rocket(state)).await.expect("valid rocket")
    }

    async fn answer(server: &mut ServerGuard, method: &str, result: &str) -> Mock {
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": method })))
            .with_header("content-type", "application/json")
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
            .create_async()
            .await
    }

    #[rocket::async_test]
    async fn health_is_static() {
        let api = api_for("http://127.0.0.1:1").await;
        let response = api.get("/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.as_deref(), Some("OK"));
    }

    #[rocket::async_test]
    async fn status_before_first_connect() {
        let api = api_for("http://127.0.0.1:1").await;
        let response = api.get("/api/blockchain/status").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["connected"], json!(false));
        assert_eq!(body["status"], json!("Disconnected"));
        assert_eq!(body["network"], json!("Base Sepolia"));
        assert!(body.get("chain_id").is_none());
    }

    #[rocket::async_test]
    async fn ping_goes_through_managed_client() {
        let mut node = Server::new_async().await;
        let _chain = answer(&mut node, "eth_chainId", "0x14a34").await;
        let _height = answer(&mut node, "eth_blockNumber", "0x10").await;
        let _gas = answer(&mut node, "eth_gasPrice", "0x3b9aca00").await;

        let api = api_for(&node.url()).await;
        let response = api.get("/api/network/ping").dispatch().await;
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["connected"], json!(true));
        assert_eq!(body["block_number"], json!(16));
        assert_eq!(body["chain_id"], json!(84532));
        assert_eq!(body["gas_price_wei"], json!("1000000000"));

        let status: Value = api
            .get("/api/blockchain/status")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("json body");
        assert_eq!(status["status"], json!("Connected"));
    }

    #[rocket::async_test]
    async fn reconnect_is_accepted() {
        let api = api_for("http://127.0.0.1:1").await;
        let response = api.post("/api/blockchain/reconnect").dispatch().await;
        assert_eq!(response.status(), Status::Accepted);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["requested"], json!(true));
    }
}

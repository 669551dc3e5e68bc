/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for exdash-adapter tests

use exdash_adapter::{ClientConfig, DashboardClient};
use tokio::net::TcpListener;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
#[allow(dead_code)]
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Client pointed at the mock server's `/api/` prefix
#[allow(dead_code)]
pub fn client_for(server: &MockServer) -> DashboardClient {
    DashboardClient::with_config_and_urls(
        ClientConfig::default(),
        &format!("{}/api/", server.uri()),
        "ws://127.0.0.1:1/ws/user-stream",
    )
    .expect("client init")
}

/// Bind a local listener for a throwaway WebSocket server
#[allow(dead_code)]
pub async fn bind_local() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("ws://{addr}/ws/user-stream"))
}

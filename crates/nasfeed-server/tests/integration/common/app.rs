//! Running service instance for integration tests.

use nasfeed_server::{AppConfig, AppResult, Application};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestApp {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<AppResult<()>>,
}

impl TestApp {
    pub async fn spawn(config: AppConfig) -> Self {
        let app = Application::new(config).unwrap();
        let shutdown = app.shutdown_token();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(app.serve(listener));

        Self {
            addr,
            shutdown,
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(format!("http://{}{}", self.addr, path))
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> Value {
        self.get(path).await.json().await.unwrap()
    }

    /// Poll `/api/health` until the connection count equals `expected`.
    pub async fn wait_for_connections(&self, expected: u64) -> bool {
        for _ in 0..50 {
            let health = self.get_json("/api/health").await;
            if health["connections"].as_u64() == Some(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("application did not stop")
            .unwrap();
        assert!(result.is_ok(), "application failed: {result:?}");
    }
}

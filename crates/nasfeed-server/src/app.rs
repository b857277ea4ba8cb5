//! Main application orchestration.
//!
//! Coordinates all components:
//! - Data source (live RPC or fixture) behind per-kind breakers
//! - Snapshot cache and pollers
//! - Broadcast hub intake loop
//! - HTTP/WebSocket server
//!
//! One root cancellation token stops everything.

use crate::config::{AppConfig, SourceMode};
use crate::error::AppResult;
use nasfeed_feed::{PollerSet, SnapshotCache};
use nasfeed_hub::{run_server, AppState, Hub};
use nasfeed_rpc::{BreakerRegistry, DataSource, FixtureSource, GuardedSource, LiveSource, RpcClient};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main application.
pub struct Application {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops the application when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(self) -> AppResult<()> {
        let listener = nasfeed_hub::server::bind(&self.config.hub).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> AppResult<()> {
        match self.config.source {
            SourceMode::Live => {
                let client = Arc::new(RpcClient::new(self.config.rpc.clone())?);
                info!(url = %self.config.rpc.url, "Using live backend");
                let source = LiveSource::new(client, self.config.poller.routes());
                self.serve_with(source, listener).await
            }
            SourceMode::Fixture => {
                info!(kinds = self.config.fixtures.len(), "Using fixture data source");
                let source = FixtureSource::from_payloads(self.config.fixtures.clone());
                self.serve_with(source, listener).await
            }
        }
    }

    async fn serve_with<S: DataSource>(self, source: S, listener: TcpListener) -> AppResult<()> {
        let breakers = BreakerRegistry::new(self.config.breaker.clone());
        let source = Arc::new(GuardedSource::new(source, breakers));
        let cache = Arc::new(SnapshotCache::new());
        let (intake_tx, intake_rx) = mpsc::channel(self.config.poller.intake_capacity);

        let hub = Arc::new(Hub::new(&self.config.hub, self.config.poller.kind_names()));
        let hub_task = tokio::spawn(hub.clone().run(intake_rx, self.shutdown.clone()));

        let pollers = PollerSet::spawn(
            &self.config.poller,
            source.clone(),
            cache,
            intake_tx,
            &self.shutdown,
        )?;
        info!(pollers = pollers.len(), "Pollers started");

        let state = AppState::new(hub, source, self.config.hub.clone(), self.shutdown.clone());
        let served = run_server(listener, state).await;
        if let Err(e) = &served {
            error!(error = %e, "Server failed, shutting down");
        }

        self.shutdown.cancel();
        pollers.shutdown().await?;
        hub_task.await?;

        served?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::Duration;

    fn fixture_config() -> AppConfig {
        AppConfig::parse(
            r#"
            source = "fixture"

            [poller]
            interval_ms = 50

            [fixtures."system.status"]
            hostname = "nas01"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = fixture_config();
        config.hub.queue_capacity = 0;
        assert!(Application::new(config).is_err());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let app = Application::new(fixture_config()).unwrap();
        let shutdown = app.shutdown_token();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let task = tokio::spawn(app.serve(listener));
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("application should stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}

//! Per-kind polling loop.
//!
//! Each cycle emits exactly one event:
//! - fetch succeeded: cache it, emit fresh
//! - fetch failed or breaker open, cache present: emit the cached payload as stale
//! - fetch failed or breaker open, cache empty: emit an error-only event
//!
//! A poller never exits on a fetch error. It stops only on cancellation or
//! when the intake channel is closed.

use crate::cache::SnapshotCache;
use crate::config::PollerConfig;
use crate::error::FeedResult;
use nasfeed_core::{DataKind, Event};
use nasfeed_rpc::{DataSource, GuardedError, GuardedSource};
use nasfeed_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls one data kind on a fixed interval.
pub struct Poller<S> {
    kind: DataKind,
    interval: Duration,
    source: Arc<GuardedSource<S>>,
    cache: Arc<SnapshotCache>,
    intake: mpsc::Sender<Arc<Event>>,
}

impl<S: DataSource> Poller<S> {
    pub fn new(
        kind: DataKind,
        interval: Duration,
        source: Arc<GuardedSource<S>>,
        cache: Arc<SnapshotCache>,
        intake: mpsc::Sender<Arc<Event>>,
    ) -> Self {
        Self {
            kind,
            interval,
            source,
            cache,
            intake,
        }
    }

    pub fn kind(&self) -> &DataKind {
        &self.kind
    }

    /// Run one poll cycle and return the event it produced.
    pub async fn poll_once(&self) -> Arc<Event> {
        let started = Instant::now();
        let result = self.source.fetch(&self.kind).await;

        let event = match result {
            Ok(payload) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                Metrics::fetch_latency(self.kind.as_str(), latency_ms);
                self.cache.put(self.kind.clone(), payload.clone());
                Metrics::poll_outcome(self.kind.as_str(), "fresh");
                Event::fresh(self.kind.clone(), payload)
            }
            Err(err) => self.degraded(err),
        };

        Arc::new(event)
    }

    fn degraded(&self, err: GuardedError) -> Event {
        let error_code = err.error_code();
        let failures = err.consecutive_failures();

        if err.is_circuit_open() {
            debug!(kind = %self.kind, failures, "Breaker open, serving from cache");
        } else {
            warn!(kind = %self.kind, failures, error = %err, "Poll fetch failed");
        }

        match self.cache.get(&self.kind) {
            Some(entry) => {
                Metrics::poll_outcome(self.kind.as_str(), "stale");
                Event::stale(
                    self.kind.clone(),
                    entry.payload,
                    entry.last_updated,
                    error_code,
                    failures,
                )
            }
            None => {
                Metrics::poll_outcome(self.kind.as_str(), "failure");
                Event::failure(self.kind.clone(), error_code, err.to_string(), failures)
            }
        }
    }

    /// Poll until `cancel` fires or the intake channel closes.
    ///
    /// The first cycle runs immediately.
    pub async fn run(self, cancel: CancellationToken) {
        info!(kind = %self.kind, interval_ms = self.interval.as_millis() as u64, "Poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.poll_once() => event,
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = self.intake.send(event) => sent,
            };
            if sent.is_err() {
                warn!(kind = %self.kind, "Event intake closed, stopping poller");
                break;
            }
        }

        info!(kind = %self.kind, "Poller stopped");
    }
}

/// The running pollers, one task per configured kind.
pub struct PollerSet {
    cancel: CancellationToken,
    handles: Vec<(DataKind, JoinHandle<()>)>,
}

impl PollerSet {
    /// Spawn one poller per kind in `config`.
    ///
    /// The set stops when `parent` is cancelled or on [`PollerSet::shutdown`].
    pub fn spawn<S: DataSource>(
        config: &PollerConfig,
        source: Arc<GuardedSource<S>>,
        cache: Arc<SnapshotCache>,
        intake: mpsc::Sender<Arc<Event>>,
        parent: &CancellationToken,
    ) -> FeedResult<Self> {
        config.validate()?;
        let cancel = parent.child_token();

        let handles = config
            .kinds
            .iter()
            .map(|kind_config| {
                let poller = Poller::new(
                    kind_config.kind.clone(),
                    config.interval_for(kind_config),
                    source.clone(),
                    cache.clone(),
                    intake.clone(),
                );
                let handle = tokio::spawn(poller.run(cancel.clone()));
                (kind_config.kind.clone(), handle)
            })
            .collect();

        Ok(Self { cancel, handles })
    }

    pub fn kinds(&self) -> Vec<DataKind> {
        self.handles.iter().map(|(kind, _)| kind.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every poller and wait for the tasks to finish.
    pub async fn shutdown(self) -> FeedResult<()> {
        self.cancel.cancel();
        for (kind, handle) in self.handles {
            handle.await?;
            debug!(kind = %kind, "Poller joined");
        }
        Ok(())
    }
}

//! Polling and caching for nasfeed.
//!
//! One [`Poller`] task runs per data kind. Every cycle it produces exactly
//! one [`Event`](nasfeed_core::Event): fresh on success, stale from the
//! [`SnapshotCache`] on failure or open breaker, or error-only when nothing
//! has been cached yet.

pub mod cache;
pub mod config;
pub mod error;
pub mod poller;

pub use cache::{CacheEntry, SnapshotCache};
pub use config::{KindConfig, PollerConfig};
pub use error::{FeedError, FeedResult};
pub use poller::{Poller, PollerSet};

//! Broadcast hub for nasfeed.
//!
//! Events from every poller arrive on one intake channel. The [`Hub`] owns
//! the subscriber registry and fans each event out to the bounded outbound
//! queue of every connection that wants its kind. Connections are served by
//! one reader task and one writer loop each; neither can block the hub.

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod queue;
pub mod registry;
pub mod server;

pub use config::{HubConfig, SlowConsumerPolicy};
pub use connection::serve_connection;
pub use error::{HubError, HubResult};
pub use hub::Hub;
pub use queue::{OutboundQueue, PushOutcome};
pub use registry::{
    ConnectionHandle, ConnectionId, ConnectionState, SubscriberRegistry, Subscription,
};
pub use server::{create_router, run_server, AppState, ConnectionGuard, ConnectionLimiter};

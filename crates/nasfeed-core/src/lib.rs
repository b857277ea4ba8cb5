//! Core domain types for the nasfeed telemetry broadcaster.
//!
//! This crate provides the types shared by every stage of the pipeline:
//! - `DataKind`: Identifier for one polled telemetry stream (e.g. "system.status")
//! - `Event`: Immutable result of one poll cycle (fresh, stale, or failure)
//! - `ErrorCode`: Classified failure reasons surfaced to viewers
//! - `ServerMessage` / `ClientMessage`: WebSocket wire formats

pub mod error;
pub mod event;
pub mod kind;
pub mod message;

pub use error::{CoreError, Result};
pub use event::{ErrorCode, Event, EventBody, FailureClass};
pub use kind::DataKind;
pub use message::{ClientMessage, ServerMessage};

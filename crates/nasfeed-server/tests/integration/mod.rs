//! Integration tests for nasfeed-server.
//!
//! These tests run the whole service on a loopback port:
//! - WebSocket subscription filtering and fan-out
//! - Client disconnects during broadcast
//! - Stale degradation and recovery against a mock JSON-RPC backend

pub mod common;

//! Shared test helpers.

#![allow(dead_code)]

pub mod app;
pub mod mock_rpc;
pub mod ws_client;

//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, blockchain RPC,
//! file I/O). Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Marketplace history sources and token metadata over HTTP
//! - `chain`: EVM lending contracts via alloy-rs, plus the SOL client
//! - `feeds`: Live marketplace feed over a WebSocket session
//! - `http`: Axum server for the lending API, hooks and probes
//! - `metrics`: Prometheus metrics registry
//! - `persistence`: In-memory store and JSON snapshots

pub mod api;
pub mod chain;
pub mod feeds;
pub mod http;
pub mod metrics;
pub mod persistence;

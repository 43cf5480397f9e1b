//! HTTP Adapter - Axum Routes for the Lending Service
//!
//! Client routes (loans, offers, asset history), chain webhooks,
//! `/metrics` and the `/live` + `/ready` probes share one server.

pub mod server;

pub use server::{ApiError, ErrorBody, HttpServer, InstructionReply, ServerState, serve};

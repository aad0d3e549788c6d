//! # HTTP Server Module
//!
//! Axum server exposing the document store.
//!
//! # Endpoints
//!
//! - `GET /` - Live keys
//! - `GET|POST|PATCH|DELETE /r/*key` - Read, replace, patch, delete
//! - `/ws` - WebSocket request and change notification protocol
//! - `/time` - WebSocket clock stream

pub mod config;
pub mod realtime_routes;
pub mod routes;
pub mod server;

pub use config::ServerConfig;
pub use server::{AppState, Server, ServerError, ServerResult};

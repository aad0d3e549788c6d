//! katamari - a key-addressed document store with real-time change
//! notification and merge-based writes
//!
//! Writes go through [`core::WriteCoordinator`], which serializes every
//! mutation of a key, journals it, and publishes the committed change to
//! the sessions whose patterns match the key.

pub mod auth;
pub mod cli;
pub mod core;
pub mod http_server;
pub mod keyspace;
pub mod observability;
pub mod realtime;
pub mod storage;

pub use crate::core::{CoreError, CoreResult, ReadOutcome, WriteCoordinator};
pub use http_server::{Server, ServerConfig, ServerError};
pub use storage::{Document, KeyStore};

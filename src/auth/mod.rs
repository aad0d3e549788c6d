//! # Access Control
//!
//! Permission collaborator consulted by the write coordinator before any
//! state change. Policy content is pluggable.

pub mod errors;
pub mod filter;

pub use errors::{AccessError, AccessResult};
pub use filter::{AccessFilter, AccessRequest, AllowAll, FilterRules, Operation};

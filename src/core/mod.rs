//! # Core Module
//!
//! The write path shared by every transport: the coordinator that turns
//! requests into store mutations and change notifications, and the router
//! that drives it from session frames.

pub mod coordinator;
pub mod error;
pub mod router;

pub use coordinator::{ReadOutcome, WriteCoordinator};
pub use error::{CoreError, CoreResult};
pub use router::RequestRouter;

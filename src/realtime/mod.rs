//! # Real-Time Module
//!
//! Change notification for connected sessions.
//!
//! ## Architecture
//!
//! - **Pattern Index**: key patterns to subscribed sessions
//! - **Sessions**: subscription sets and bounded outbound queues
//! - **Change Bus**: fan-out of committed changes
//! - **Protocol**: JSON frames exchanged with clients

pub mod bus;
pub mod errors;
pub mod event;
pub mod index;
pub mod protocol;
pub mod session;

pub use bus::{ChangeBus, DispatchResult};
pub use errors::{RealtimeError, RealtimeResult};
pub use event::{ChangeEvent, ChangeKind};
pub use index::PatternIndex;
pub use protocol::{Request, RequestOp, ServerMessage};
pub use session::{Outbox, SessionConfig, SessionId, SessionManager};

//! # Change Bus
//!
//! Fans committed changes out to subscribed sessions.
//!
//! `publish` is called by the write path while it still holds the key's
//! critical section, so events for one key are enqueued in version order.
//! Enqueueing never blocks; a session whose queue is full is dropped by the
//! session manager and the remaining sessions still receive the event.

use std::sync::Arc;

use tracing::trace;

use super::event::ChangeEvent;
use super::index::PatternIndex;
use super::protocol::ServerMessage;
use super::session::{SessionConfig, SessionManager};

/// Change bus shared by the write path and the transports
#[derive(Debug)]
pub struct ChangeBus {
    index: Arc<PatternIndex>,
    sessions: Arc<SessionManager>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ChangeBus {
    pub fn new(config: SessionConfig) -> Self {
        let index = Arc::new(PatternIndex::new());
        let sessions = Arc::new(SessionManager::new(Arc::clone(&index), config));
        Self { index, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn index(&self) -> &Arc<PatternIndex> {
        &self.index
    }

    /// Deliver `event` to every session with a matching pattern.
    ///
    /// A session subscribed through several matching patterns still gets
    /// the event once.
    pub fn publish(&self, event: &ChangeEvent) -> DispatchResult {
        let mut result = DispatchResult::default();

        let targets = self.index.matching_sessions(&event.key);
        result.matched = targets.len();

        for session in targets {
            let message = ServerMessage::Change {
                event: event.clone(),
            };
            if self.sessions.enqueue(session, message) {
                result.delivered += 1;
            } else {
                result.dropped += 1;
            }
        }

        trace!(
            key = %event.key,
            version = event.version,
            matched = result.matched,
            delivered = result.delivered,
            "Change published"
        );
        result
    }
}

/// Result of publishing one event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    /// Sessions with a matching subscription
    pub matched: usize,
    /// Sessions the event was queued for
    pub delivered: usize,
    /// Sessions disconnected or gone before delivery
    pub dropped: usize,
}

//! # Session Manager
//!
//! Owns the live sessions, their subscription sets and their outbound
//! queues.
//!
//! Each session gets a bounded queue. Enqueueing never blocks: when a
//! session's queue is full the session is treated as a slow consumer and
//! disconnected (deregistered, queue closed) so that it can never hold up
//! writers or other sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{RealtimeError, RealtimeResult};
use super::index::PatternIndex;
use super::protocol::ServerMessage;
use crate::keyspace::Pattern;

/// Identifier of one connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session limits
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Outbound queue capacity per session
    pub queue_capacity: usize,
    /// Maximum subscriptions per session
    pub max_subscriptions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_subscriptions: 100,
        }
    }
}

#[derive(Debug)]
struct SessionHandle {
    sender: mpsc::Sender<ServerMessage>,
    subscriptions: Mutex<HashMap<String, Pattern>>,
    closed: Arc<AtomicBool>,
}

/// Receiving end of a session's outbound queue, owned by the transport loop.
#[derive(Debug)]
pub struct Outbox {
    id: SessionId,
    receiver: mpsc::Receiver<ServerMessage>,
    closed: Arc<AtomicBool>,
}

impl Outbox {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Next message to write to the wire, in enqueue order.
    ///
    /// Returns `None` once the session has been deregistered; anything
    /// still buffered at that point is discarded.
    pub async fn next(&mut self) -> Option<ServerMessage> {
        if self.closed.load(Ordering::Acquire) {
            self.receiver.close();
            return None;
        }
        let message = self.receiver.recv().await?;
        if self.closed.load(Ordering::Acquire) {
            self.receiver.close();
            return None;
        }
        Some(message)
    }
}

/// Registry of live sessions
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    index: Arc<PatternIndex>,
    config: SessionConfig,
    shutting_down: AtomicBool,
}

impl SessionManager {
    pub fn new(index: Arc<PatternIndex>, config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            index,
            config,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Index this manager keeps in sync with its subscription sets
    pub fn index(&self) -> &Arc<PatternIndex> {
        &self.index
    }

    /// Register a new session and hand back its outbox.
    pub fn register(&self) -> RealtimeResult<(SessionId, Outbox)> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(RealtimeError::ShuttingDown);
        }

        let id = SessionId::new();
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let handle = Arc::new(SessionHandle {
            sender,
            subscriptions: Mutex::new(HashMap::new()),
            closed: Arc::clone(&closed),
        });

        self.sessions
            .write()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?
            .insert(id, handle);

        debug!(session = %id, "Session registered");
        Ok((
            id,
            Outbox {
                id,
                receiver,
                closed,
            },
        ))
    }

    /// Tear a session down: drop all its subscriptions from the index and
    /// close its queue. Returns false if it was not registered.
    pub fn deregister(&self, id: SessionId) -> bool {
        let handle = match self.sessions.write() {
            Ok(mut sessions) => sessions.remove(&id),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return false;
        };

        handle.closed.store(true, Ordering::Release);
        if let Ok(mut subscriptions) = handle.subscriptions.lock() {
            for pattern in subscriptions.values() {
                self.index.unsubscribe(pattern, id);
            }
            subscriptions.clear();
        }

        debug!(session = %id, "Session deregistered");
        true
    }

    fn handle(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(&id).cloned())
    }

    /// Queue a message for a session without blocking.
    ///
    /// Unknown sessions are a no-op. A full queue disconnects the session.
    pub fn enqueue(&self, id: SessionId, message: ServerMessage) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };

        match handle.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    session = %id,
                    capacity = self.config.queue_capacity,
                    "Outbound queue full, disconnecting slow session"
                );
                self.deregister(id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.deregister(id);
                false
            }
        }
    }

    /// Add a subscription; subscribing twice to the same pattern is a no-op.
    pub fn subscribe(&self, id: SessionId, pattern: &str) -> RealtimeResult<Pattern> {
        let compiled =
            Pattern::parse(pattern).map_err(|e| RealtimeError::InvalidPattern(e.to_string()))?;
        let handle = self
            .handle(id)
            .ok_or_else(|| RealtimeError::SessionNotFound(id.to_string()))?;

        let mut subscriptions = handle
            .subscriptions
            .lock()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        // deregister flips `closed` before draining this set
        if handle.closed.load(Ordering::Acquire) {
            return Err(RealtimeError::SessionNotFound(id.to_string()));
        }
        if subscriptions.contains_key(pattern) {
            return Ok(compiled);
        }
        if subscriptions.len() >= self.config.max_subscriptions {
            return Err(RealtimeError::TooManySubscriptions(
                self.config.max_subscriptions,
            ));
        }

        self.index.subscribe(&compiled, id);
        subscriptions.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Remove one subscription.
    pub fn unsubscribe(&self, id: SessionId, pattern: &str) -> RealtimeResult<()> {
        let handle = self
            .handle(id)
            .ok_or_else(|| RealtimeError::SessionNotFound(id.to_string()))?;

        let mut subscriptions = handle
            .subscriptions
            .lock()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        let compiled = subscriptions
            .remove(pattern)
            .ok_or_else(|| RealtimeError::SubscriptionNotFound(pattern.to_string()))?;
        self.index.unsubscribe(&compiled, id);
        Ok(())
    }

    /// Patterns a session is subscribed to, sorted
    pub fn subscriptions(&self, id: SessionId) -> Vec<String> {
        let Some(handle) = self.handle(id) else {
            return Vec::new();
        };
        let mut patterns: Vec<String> = handle
            .subscriptions
            .lock()
            .map(|subscriptions| subscriptions.keys().cloned().collect())
            .unwrap_or_default();
        patterns.sort();
        patterns
    }

    /// Whether the session is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.handle(id).is_some()
    }

    /// Get session count
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting sessions and deregister every live one.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::Release);
        let ids: Vec<SessionId> = self
            .sessions
            .read()
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default();

        ids.into_iter().filter(|id| self.deregister(*id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(queue_capacity: usize) -> SessionManager {
        SessionManager::new(
            Arc::new(PatternIndex::new()),
            SessionConfig {
                queue_capacity,
                max_subscriptions: 3,
            },
        )
    }

    fn pong(id: &str) -> ServerMessage {
        ServerMessage::Pong {
            id: Some(id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_fifo() {
        let sessions = manager(8);
        let (id, mut outbox) = sessions.register().unwrap();

        assert!(sessions.enqueue(id, pong("1")));
        assert!(sessions.enqueue(id, pong("2")));
        assert!(sessions.enqueue(id, pong("3")));

        assert_eq!(outbox.next().await, Some(pong("1")));
        assert_eq!(outbox.next().await, Some(pong("2")));
        assert_eq!(outbox.next().await, Some(pong("3")));
    }

    #[test]
    fn test_enqueue_to_unknown_session_is_noop() {
        let sessions = manager(8);
        assert!(!sessions.enqueue(SessionId::new(), pong("x")));
    }

    #[tokio::test]
    async fn test_deregister_clears_index_and_closes_outbox() {
        let sessions = manager(8);
        let (id, mut outbox) = sessions.register().unwrap();
        sessions.subscribe(id, "rooms/*").unwrap();
        sessions.subscribe(id, "lobby").unwrap();
        sessions.enqueue(id, pong("pending"));

        assert!(sessions.deregister(id));
        assert!(!sessions.deregister(id));
        assert!(sessions.index().is_empty());
        assert!(sessions.index().matching_sessions("rooms/1").is_empty());
        assert_eq!(outbox.next().await, None);
        assert!(!sessions.enqueue(id, pong("late")));
    }

    #[tokio::test]
    async fn test_full_queue_disconnects_slow_session() {
        let sessions = manager(2);
        let (slow, mut slow_outbox) = sessions.register().unwrap();
        let (fast, mut fast_outbox) = sessions.register().unwrap();

        assert!(sessions.enqueue(slow, pong("1")));
        assert!(sessions.enqueue(slow, pong("2")));
        assert!(!sessions.enqueue(slow, pong("3")));

        assert!(!sessions.contains(slow));
        assert_eq!(slow_outbox.next().await, None);

        assert!(sessions.enqueue(fast, pong("ok")));
        assert_eq!(fast_outbox.next().await, Some(pong("ok")));
    }

    #[test]
    fn test_subscription_limits_and_errors() {
        let sessions = manager(8);
        let (id, _outbox) = sessions.register().unwrap();

        sessions.subscribe(id, "a").unwrap();
        sessions.subscribe(id, "a").unwrap();
        sessions.subscribe(id, "b").unwrap();
        sessions.subscribe(id, "c/*").unwrap();
        assert!(matches!(
            sessions.subscribe(id, "d"),
            Err(RealtimeError::TooManySubscriptions(3))
        ));
        assert!(matches!(
            sessions.subscribe(id, "bad//pattern"),
            Err(RealtimeError::InvalidPattern(_))
        ));
        assert!(matches!(
            sessions.unsubscribe(id, "zzz"),
            Err(RealtimeError::SubscriptionNotFound(_))
        ));

        sessions.unsubscribe(id, "b").unwrap();
        assert_eq!(sessions.subscriptions(id), vec!["a".to_string(), "c/*".to_string()]);
    }

    #[test]
    fn test_subscribe_unknown_session() {
        let sessions = manager(8);
        assert!(matches!(
            sessions.subscribe(SessionId::new(), "a"),
            Err(RealtimeError::SessionNotFound(_))
        ));
        assert!(sessions.index().is_empty());
    }

    #[test]
    fn test_shutdown_rejects_new_sessions() {
        let sessions = manager(8);
        let (_a, _outbox_a) = sessions.register().unwrap();
        let (_b, _outbox_b) = sessions.register().unwrap();

        assert_eq!(sessions.shutdown(), 2);
        assert!(sessions.is_empty());
        assert!(matches!(sessions.register(), Err(RealtimeError::ShuttingDown)));
    }
}

//! # Request Router
//!
//! Transport-independent session handling: connect, decode, dispatch,
//! reply, disconnect. Replies and errors go only to the session that sent
//! the request, through its outbound queue.

use std::sync::Arc;

use tracing::{debug, warn};

use super::coordinator::{ReadOutcome, WriteCoordinator};
use super::error::CoreError;
use crate::realtime::protocol;
use crate::realtime::{Outbox, RealtimeResult, Request, RequestOp, ServerMessage, SessionId};

/// Routes decoded session requests to the coordinator.
#[derive(Clone)]
pub struct RequestRouter {
    coordinator: Arc<WriteCoordinator>,
}

impl RequestRouter {
    pub fn new(coordinator: Arc<WriteCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<WriteCoordinator> {
        &self.coordinator
    }

    /// Register a new session.
    pub fn on_connect(&self) -> RealtimeResult<(SessionId, Outbox)> {
        let (session, outbox) = self.coordinator.bus().sessions().register()?;
        debug!(session = %session, "Session connected");
        Ok((session, outbox))
    }

    /// Handle one raw text frame. Returns false if the session is gone and
    /// the reply could not be queued.
    pub fn on_message(&self, session: SessionId, raw: &str) -> bool {
        let reply = match protocol::decode_request(raw) {
            Ok(request) => self.execute(session, request),
            Err(e) => {
                warn!(session = %session, error = %e, "Undecodable request");
                error_message(None, &CoreError::malformed(e.to_string()))
            }
        };
        self.coordinator.bus().sessions().enqueue(session, reply)
    }

    /// Handle one raw binary frame. The payload must be UTF-8 JSON; any
    /// other bytes are rejected as malformed rather than rewritten.
    pub fn on_binary(&self, session: SessionId, raw: &[u8]) -> bool {
        match std::str::from_utf8(raw) {
            Ok(text) => self.on_message(session, text),
            Err(e) => {
                warn!(session = %session, error = %e, "Binary frame is not UTF-8");
                let reply = error_message(
                    None,
                    &CoreError::malformed(format!("Frame is not valid UTF-8: {}", e)),
                );
                self.coordinator.bus().sessions().enqueue(session, reply)
            }
        }
    }

    /// Execute a decoded request and build the reply.
    pub fn execute(&self, session: SessionId, request: Request) -> ServerMessage {
        let Request { id, op } = request;
        let coordinator = &self.coordinator;

        let result = match op {
            RequestOp::Read { key } => coordinator.read(&key).map(|outcome| match outcome {
                ReadOutcome::Document(document) => ServerMessage::Document {
                    id: id.clone(),
                    document,
                },
                ReadOutcome::List(documents) => ServerMessage::List {
                    id: id.clone(),
                    documents,
                },
            }),
            RequestOp::Replace { key, value } => {
                coordinator.replace(&key, value).map(|doc| ServerMessage::Ack {
                    id: id.clone(),
                    key: doc.key,
                    version: doc.version,
                })
            }
            RequestOp::Patch { key, value } => {
                coordinator.patch(&key, value).map(|doc| ServerMessage::Ack {
                    id: id.clone(),
                    key: doc.key,
                    version: doc.version,
                })
            }
            RequestOp::Delete { key } => {
                coordinator
                    .delete(&key)
                    .map(|count| ServerMessage::Deleted {
                        id: id.clone(),
                        key,
                        count,
                    })
            }
            RequestOp::Subscribe { pattern } => {
                coordinator
                    .subscribe(session, &pattern)
                    .map(|snapshot| ServerMessage::Subscribed {
                        id: id.clone(),
                        pattern,
                        snapshot,
                    })
            }
            RequestOp::Unsubscribe { pattern } => coordinator
                .unsubscribe(session, &pattern)
                .map(|()| ServerMessage::Unsubscribed {
                    id: id.clone(),
                    pattern,
                }),
            RequestOp::Ping => Ok(ServerMessage::Pong { id: id.clone() }),
        };

        result.unwrap_or_else(|e| {
            debug!(session = %session, code = e.code(), error = %e, "Request failed");
            error_message(id, &e)
        })
    }

    /// Drop the session and all of its subscriptions.
    pub fn on_disconnect(&self, session: SessionId) {
        if self.coordinator.bus().sessions().deregister(session) {
            debug!(session = %session, "Session disconnected");
        }
    }
}

fn error_message(id: Option<String>, error: &CoreError) -> ServerMessage {
    ServerMessage::Error {
        id,
        code: error.code().to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeBus;
    use crate::storage::KeyStore;
    use serde_json::json;

    fn router() -> RequestRouter {
        RequestRouter::new(Arc::new(WriteCoordinator::new(
            Arc::new(KeyStore::new()),
            Arc::new(ChangeBus::default()),
            false,
        )))
    }

    #[tokio::test]
    async fn test_malformed_frame_only_answers_sender() {
        let router = router();
        let (alice, mut alice_out) = router.on_connect().unwrap();
        let (bob, _bob_out) = router.on_connect().unwrap();

        assert!(router.on_message(alice, "{not json"));
        match alice_out.next().await {
            Some(ServerMessage::Error { id, code, .. }) => {
                assert_eq!(id, None);
                assert_eq!(code, "MALFORMED_REQUEST");
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(router.coordinator().bus().sessions().contains(bob));
    }

    #[tokio::test]
    async fn test_binary_frame_must_be_utf8() {
        let router = router();
        let (session, mut outbox) = router.on_connect().unwrap();

        let mut frame = br#"{"type":"replace","key":"a","value":"x"#.to_vec();
        frame.extend_from_slice(&[0xff, 0xfe]);
        frame.extend_from_slice(br#""}"#);
        assert!(router.on_binary(session, &frame));
        match outbox.next().await {
            Some(ServerMessage::Error { id, code, .. }) => {
                assert_eq!(id, None);
                assert_eq!(code, "MALFORMED_REQUEST");
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(router.coordinator().store().get("a").unwrap(), None);

        router.on_binary(session, br#"{"type":"ping","id":"b"}"#);
        assert_eq!(
            outbox.next().await,
            Some(ServerMessage::Pong { id: Some("b".into()) })
        );
    }

    #[tokio::test]
    async fn test_request_reply_echoes_id() {
        let router = router();
        let (session, mut outbox) = router.on_connect().unwrap();

        router.on_message(
            session,
            r#"{"type":"replace","id":"w1","key":"a","value":{"x":1}}"#,
        );
        assert_eq!(
            outbox.next().await,
            Some(ServerMessage::Ack {
                id: Some("w1".into()),
                key: "a".into(),
                version: 1
            })
        );

        router.on_message(session, r#"{"type":"read","id":"r1","key":"missing"}"#);
        match outbox.next().await {
            Some(ServerMessage::Error { id, code, .. }) => {
                assert_eq!(id.as_deref(), Some("r1"));
                assert_eq!(code, "NOT_FOUND");
            }
            other => panic!("expected error, got {:?}", other),
        }

        router.on_message(session, r#"{"type":"ping","id":"p"}"#);
        assert_eq!(
            outbox.next().await,
            Some(ServerMessage::Pong { id: Some("p".into()) })
        );
    }

    #[tokio::test]
    async fn test_subscribe_then_receive_change() {
        let router = router();
        let (watcher, mut watcher_out) = router.on_connect().unwrap();
        let (writer, _writer_out) = router.on_connect().unwrap();

        router.on_message(watcher, r#"{"type":"subscribe","pattern":"rooms/*"}"#);
        assert!(matches!(
            watcher_out.next().await,
            Some(ServerMessage::Subscribed { snapshot, .. }) if snapshot.is_empty()
        ));

        let reply = router.execute(
            writer,
            Request {
                id: None,
                op: RequestOp::Patch {
                    key: "rooms/1".into(),
                    value: json!({"topic": "rust"}),
                },
            },
        );
        assert!(matches!(reply, ServerMessage::Ack { version: 1, .. }));

        match watcher_out.next().await {
            Some(ServerMessage::Change { event }) => {
                assert_eq!(event.key, "rooms/1");
                assert_eq!(event.value, json!({"topic": "rust"}));
            }
            other => panic!("expected change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_removes_subscriptions() {
        let router = router();
        let (session, _outbox) = router.on_connect().unwrap();
        router.on_message(session, r#"{"type":"subscribe","pattern":"**"}"#);

        router.on_disconnect(session);
        router.on_disconnect(session);
        assert!(router.coordinator().bus().index().is_empty());
        assert!(!router.on_message(session, r#"{"type":"ping"}"#));
    }
}

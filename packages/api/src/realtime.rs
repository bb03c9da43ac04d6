//! WebSocket session protocol for live job updates.
//!
//! A [`WsSession`] is transport-agnostic: feed it every text frame the client
//! sends and forward everything that arrives on its outbound channel.
//!
//! Client messages:
//! - `{"type": "subscribe", "jobId": "..."}`
//! - `{"type": "unsubscribe", "jobId": "..."}`
//! - `{"type": "ping"}`

use std::collections::HashMap;
use std::sync::Arc;

use actors::{Broadcaster, SinkClosed, SubscriptionId, UpdateSink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use studio_core::{Job, JobId, JobUpdate};
use tokio::sync::mpsc;

/// Messages pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Subscribed { job_id: JobId },
    Unsubscribed { job_id: JobId },
    /// Milliseconds since the Unix epoch.
    Pong { timestamp: i64 },
    JobUpdate { job_id: JobId, data: Job },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Broadcaster sink that turns updates into `job-update` frames.
struct WsSink {
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl UpdateSink for WsSink {
    fn deliver(&self, update: &JobUpdate) -> Result<(), SinkClosed> {
        self.outbound
            .send(ServerMessage::JobUpdate {
                job_id: update.job_id,
                data: update.job.clone(),
            })
            .map_err(|_| SinkClosed)
    }
}

/// One connected WebSocket client.
///
/// Dropping the session removes all of its subscriptions.
pub struct WsSession {
    broadcaster: Arc<Broadcaster>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    subscriptions: HashMap<JobId, SubscriptionId>,
}

impl WsSession {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            broadcaster,
            outbound,
            subscriptions: HashMap::new(),
        }
    }

    /// Create a session together with the receiver for its outbound frames.
    pub fn channel(
        broadcaster: Arc<Broadcaster>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(broadcaster, tx), rx)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Handle one text frame from the client.
    ///
    /// Replies go out on the outbound channel, ahead of any update they
    /// enable.
    pub fn handle_text(&mut self, text: &str) {
        let Some((kind, message)) = parse_client_message(text) else {
            self.send(ServerMessage::error("Invalid message format"));
            return;
        };

        match kind.as_str() {
            "subscribe" => match job_id_field(&message) {
                Ok(job_id) => self.subscribe(job_id),
                Err(reply) => self.send(reply),
            },
            "unsubscribe" => match job_id_field(&message) {
                Ok(job_id) => self.unsubscribe(job_id),
                Err(reply) => self.send(reply),
            },
            "ping" => self.send(ServerMessage::Pong {
                timestamp: chrono::Utc::now().timestamp_millis(),
            }),
            other => self.send(ServerMessage::error(format!("Unknown message type: {other}"))),
        }
    }

    fn subscribe(&mut self, job_id: JobId) {
        self.send(ServerMessage::Subscribed { job_id });
        if self.subscriptions.contains_key(&job_id) {
            return;
        }

        let sink = Arc::new(WsSink {
            outbound: self.outbound.clone(),
        });
        let subscription = self.broadcaster.subscribe(job_id, sink);
        self.subscriptions.insert(job_id, subscription);
        tracing::debug!(job_id = %job_id, subscription = %subscription, "WebSocket subscribed");
    }

    fn unsubscribe(&mut self, job_id: JobId) {
        if let Some(subscription) = self.subscriptions.remove(&job_id) {
            self.broadcaster.unsubscribe(job_id, subscription);
        }
        self.send(ServerMessage::Unsubscribed { job_id });
    }

    /// Remove every subscription of this session.
    pub fn close(&mut self) {
        for (job_id, subscription) in self.subscriptions.drain() {
            self.broadcaster.unsubscribe(job_id, subscription);
        }
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            tracing::debug!("WebSocket outbound channel closed");
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Split a client frame into its `type` and the full object.
fn parse_client_message(text: &str) -> Option<(String, Value)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let kind = value.as_object()?.get("type")?.as_str()?.to_string();
    Some((kind, value))
}

fn job_id_field(message: &Value) -> Result<JobId, ServerMessage> {
    let raw = message
        .get("jobId")
        .and_then(Value::as_str)
        .ok_or_else(|| ServerMessage::error("Invalid message format"))?;
    JobId::parse(raw).map_err(|_| ServerMessage::error(format!("Invalid job ID: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> (WsSession, mpsc::UnboundedReceiver<ServerMessage>, Arc<Broadcaster>) {
        let broadcaster = Arc::new(Broadcaster::new());
        let (session, rx) = WsSession::channel(broadcaster.clone());
        (session, rx, broadcaster)
    }

    #[test]
    fn server_messages_use_wire_names() {
        let job_id = JobId::new();
        let json = serde_json::to_value(ServerMessage::Subscribed { job_id }).unwrap();
        assert_eq!(json, json!({"type": "subscribed", "jobId": job_id.to_string()}));

        let json = serde_json::to_value(ServerMessage::Pong { timestamp: 42 }).unwrap();
        assert_eq!(json, json!({"type": "pong", "timestamp": 42}));
    }

    #[test]
    fn rejects_malformed_frames() {
        let (mut session, mut rx, _) = session();

        for frame in ["not json", "[1, 2]", r#"{"jobId": "x"}"#, r#"{"type": 7}"#] {
            session.handle_text(frame);
            assert_eq!(
                rx.try_recv().unwrap(),
                ServerMessage::error("Invalid message format"),
                "{frame}"
            );
        }

        session.handle_text(r#"{"type": "dance"}"#);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::error("Unknown message type: dance"));

        session.handle_text(r#"{"type": "subscribe", "jobId": "nope"}"#);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::error("Invalid job ID: nope"));
        assert_eq!(session.subscription_count(), 0);
    }

    #[test]
    fn ping_answers_with_pong() {
        let (mut session, mut rx, _) = session();
        let before = chrono::Utc::now().timestamp_millis();
        session.handle_text(r#"{"type": "ping"}"#);

        match rx.try_recv().unwrap() {
            ServerMessage::Pong { timestamp } => assert!(timestamp >= before),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_is_idempotent_and_close_unsubscribes() {
        let (mut session, mut rx, broadcaster) = session();
        let job_id = JobId::new();
        let frame = json!({"type": "subscribe", "jobId": job_id.to_string()}).to_string();

        session.handle_text(&frame);
        session.handle_text(&frame);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Subscribed { job_id });
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Subscribed { job_id });
        assert_eq!(broadcaster.subscriber_count(job_id), 1);

        drop(session);
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
    }

    #[test]
    fn unsubscribe_stops_updates() {
        let (mut session, mut rx, broadcaster) = session();
        let job_id = JobId::new();

        let id = job_id.to_string();
        session.handle_text(&json!({"type": "subscribe", "jobId": id}).to_string());
        session.handle_text(&json!({"type": "unsubscribe", "jobId": id}).to_string());

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Subscribed { job_id });
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Unsubscribed { job_id });
        assert_eq!(session.subscription_count(), 0);
        assert_eq!(broadcaster.subscriber_count(job_id), 0);
    }
}

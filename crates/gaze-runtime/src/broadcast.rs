//! Broadcast hub feeding the publish socket.
//!
//! Emitting subsystems enqueue onto a bounded channel and never block; the
//! publisher worker in the control plane drains the other end and does the
//! socket I/O. A full queue drops the message with a warning rather than
//! stalling the orchestrator or the render loop.

use gaze_core::messages::{BroadcastMessage, BroadcastTopic, ProtocolEventMessage};
use tokio::sync::mpsc;
use tracing::warn;

/// Queue depth before broadcasts are dropped.
const QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastHub {
    tx: mpsc::Sender<BroadcastMessage>,
}

impl BroadcastHub {
    /// Create the hub and the receiving end for the publisher worker.
    pub fn channel() -> (Self, mpsc::Receiver<BroadcastMessage>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Emit a session lifecycle event on the `PROTOCOL` topic.
    pub fn protocol_event(&self, message: ProtocolEventMessage) {
        match serde_json::to_string(&message) {
            Ok(payload) => self.send(BroadcastMessage {
                topic: BroadcastTopic::Protocol,
                payload,
            }),
            Err(err) => warn!("failed to serialize protocol event: {err}"),
        }
    }

    /// Emit a log line on the `LOG` topic.
    pub fn log(&self, level: &str, message: &str) {
        let payload = serde_json::json!({ "level": level, "message": message }).to_string();
        self.send(BroadcastMessage {
            topic: BroadcastTopic::Log,
            payload,
        });
    }

    fn send(&self, message: BroadcastMessage) {
        if self.tx.try_send(message).is_err() {
            warn!("broadcast queue full, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_core::messages::ProtocolEvent;

    #[test]
    fn protocol_events_arrive_in_order() {
        let (hub, mut rx) = BroadcastHub::channel();
        hub.protocol_event(ProtocolEventMessage::new("u", ProtocolEvent::TaskStart, 0));
        hub.protocol_event(ProtocolEventMessage::new("u", ProtocolEvent::TaskEnd, 0));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.topic, BroadcastTopic::Protocol);
        let event: ProtocolEventMessage = serde_json::from_str(&first.payload).unwrap();
        assert_eq!(event.event, Some(ProtocolEvent::TaskStart));

        let second = rx.try_recv().unwrap();
        let event: ProtocolEventMessage = serde_json::from_str(&second.payload).unwrap();
        assert_eq!(event.event, Some(ProtocolEvent::TaskEnd));
    }

    #[test]
    fn log_messages_use_the_log_topic() {
        let (hub, mut rx) = BroadcastHub::channel();
        hub.log("info", "saving complete");
        let message = rx.try_recv().unwrap();
        assert_eq!(message.topic, BroadcastTopic::Log);
        assert!(message.payload.contains("saving complete"));
    }
}

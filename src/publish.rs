//! Out-of-band publish events and the channel they are delivered to.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Which standard channel a stream event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload for the transport layer's publish channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum PublishEvent {
    /// Text written to stdout or stderr
    Stream { name: StreamName, text: String },
    /// The rendered value of a cell, keyed by execution counter
    ExecuteResult {
        execution_count: i64,
        data: Map<String, Value>,
        metadata: Map<String, Value>,
    },
}

impl PublishEvent {
    pub fn stream(name: StreamName, text: impl Into<String>) -> Self {
        PublishEvent::Stream {
            name,
            text: text.into(),
        }
    }

    /// An execute result carrying a single `text/plain` representation
    pub fn execute_result(execution_count: i64, text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), Value::String(text.into()));
        PublishEvent::ExecuteResult {
            execution_count,
            data,
            metadata: Map::new(),
        }
    }
}

/// Receives publish events on behalf of the transport layer.
///
/// Implementations must be shareable across threads: output capture
/// publishes from the threads that drain the redirected channels.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: PublishEvent);

    fn publish_stream(&self, name: StreamName, text: &str) {
        self.publish(PublishEvent::stream(name, text));
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, event: PublishEvent) {
        (**self).publish(event);
    }
}

/// Forwards events into an mpsc channel
pub struct ChannelPublisher {
    sender: Sender<PublishEvent>,
}

impl Publisher for ChannelPublisher {
    fn publish(&self, event: PublishEvent) {
        if self.sender.send(event).is_err() {
            debug!("publish receiver dropped; event discarded");
        }
    }
}

/// Create a publisher and the receiving end the transport reads from
pub fn channel() -> (ChannelPublisher, Receiver<PublishEvent>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelPublisher { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_result_serializes_as_protocol_message() {
        let event = PublishEvent::execute_result(7, "42");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "msg_type": "execute_result",
                "content": {
                    "execution_count": 7,
                    "data": {"text/plain": "42"},
                    "metadata": {},
                }
            })
        );
    }

    #[test]
    fn stream_serializes_with_channel_name() {
        let event = PublishEvent::stream(StreamName::Stderr, "oops\n");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"msg_type": "stream", "content": {"name": "stderr", "text": "oops\n"}})
        );
    }

    #[test]
    fn channel_delivers_in_order() {
        let (publisher, receiver) = channel();
        publisher.publish_stream(StreamName::Stdout, "a");
        publisher.publish_stream(StreamName::Stdout, "b");
        let texts: Vec<_> = receiver
            .try_iter()
            .map(|event| match event {
                PublishEvent::Stream { text, .. } => text,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn dropped_receiver_is_not_an_error() {
        let (publisher, receiver) = channel();
        drop(receiver);
        publisher.publish_stream(StreamName::Stdout, "lost");
    }
}

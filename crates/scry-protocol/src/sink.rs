//! Destination for outbound messages.
//!
//! Producers (the scan worker, the frame path, the hotkey tracker) publish
//! through this trait so they can be driven without sockets in tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::messages::ServerMessage;

/// Something that fans a message out to connected consumers.
pub trait MessageSink: Send + Sync {
    /// Deliver `message` to every active consumer. Must not block on I/O.
    fn publish(&self, message: ServerMessage);
}

impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    fn publish(&self, message: ServerMessage) {
        (**self).publish(message);
    }
}

/// In-memory sink that keeps every published message.
#[derive(Default, Clone)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<ServerMessage>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything published so far.
    pub fn drain(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Number of messages held.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether nothing has been published since the last drain.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl MessageSink for RecordingSink {
    fn publish(&self, message: ServerMessage) {
        self.messages.lock().push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.publish(ServerMessage::ClearAll);
        sink.publish(ServerMessage::HotkeyPressed { key: 3 });
        assert_eq!(sink.len(), 2);
        let got = sink.drain();
        assert_eq!(got[0], ServerMessage::ClearAll);
        assert_eq!(got[1], ServerMessage::HotkeyPressed { key: 3 });
        assert!(sink.is_empty());
    }

    #[test]
    fn test_arc_forwards() {
        let sink = Arc::new(RecordingSink::new());
        let as_dyn: Arc<dyn MessageSink> = sink.clone();
        as_dyn.publish(ServerMessage::ClearAll);
        assert_eq!(sink.len(), 1);
    }
}

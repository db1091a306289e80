//! Outbound message queue between the tick thread and a connection's writer

use tokio::sync::mpsc;
use tracing::debug;

/// How the writer should treat a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Flush the socket as soon as this message is written
    Immediate,
    /// May wait in the write buffer for the next flush
    Coalesced,
}

/// One encoded message ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub bytes: Vec<u8>,
    pub delivery: Delivery,
}

/// Sending half of a connection's outbound queue
///
/// Enqueueing never blocks the tick. Once the writer task has gone away the
/// outbox reports itself closed and further messages are discarded.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Create an outbox together with the receiver a writer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue `bytes` for the connection. Returns false if the connection is gone.
    pub fn enqueue(&self, bytes: Vec<u8>, delivery: Delivery) -> bool {
        let len = bytes.len();
        match self.tx.send(OutboundMessage { bytes, delivery }) {
            Ok(()) => true,
            Err(_) => {
                debug!(len, ?delivery, "Dropping message for closed connection");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_preserves_order_and_delivery() {
        let (outbox, mut rx) = Outbox::channel();
        assert!(outbox.enqueue(vec![1], Delivery::Coalesced));
        assert!(outbox.enqueue(vec![2, 3], Delivery::Immediate));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.bytes, vec![1]);
        assert_eq!(first.delivery, Delivery::Coalesced);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.bytes, vec![2, 3]);
        assert_eq!(second.delivery, Delivery::Immediate);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_outbox() {
        let (outbox, rx) = Outbox::channel();
        assert!(!outbox.is_closed());
        drop(rx);
        assert!(outbox.is_closed());
        assert!(!outbox.enqueue(vec![58], Delivery::Immediate));
    }
}

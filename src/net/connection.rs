use std::net::SocketAddr;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio::sync::mpsc;

use crate::game::player::WindowMode;
use crate::net::framing::Frame;
use crate::net::outbox::{Delivery, OutboundMessage, Outbox};

/// The tick thread's view of one client connection
///
/// Owns the outbound queue and the queue of frames read off the socket. The
/// link never touches the socket itself.
#[derive(Debug)]
pub struct ClientLink {
    pub remote_addr: SocketAddr,
    pub connected_at: Instant,
    outbox: Outbox,
    inbound: Receiver<Frame>,
    reader_gone: bool,
    frames_received: u64,
}

/// Socket-side ends of a [`ClientLink`]
#[derive(Debug)]
pub struct LinkEnds {
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub inbound: Sender<Frame>,
}

impl ClientLink {
    pub fn new(remote_addr: SocketAddr, outbox: Outbox, inbound: Receiver<Frame>) -> Self {
        Self {
            remote_addr,
            connected_at: Instant::now(),
            outbox,
            inbound,
            reader_gone: false,
            frames_received: 0,
        }
    }

    /// Create a link together with the ends the reader and writer tasks hold
    pub fn pair(remote_addr: SocketAddr) -> (Self, LinkEnds) {
        let (outbox, outbound) = Outbox::channel();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        (
            Self::new(remote_addr, outbox, inbound_rx),
            LinkEnds { outbound, inbound: inbound_tx },
        )
    }

    pub fn enqueue(&self, bytes: Vec<u8>, delivery: Delivery) -> bool {
        self.outbox.enqueue(bytes, delivery)
    }

    /// Take every frame received since the last call
    pub fn drain_inbound(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.reader_gone = true;
                    break;
                }
            }
        }
        self.frames_received += frames.len() as u64;
        frames
    }

    /// True once either socket task has gone away
    pub fn is_closed(&self) -> bool {
        self.reader_gone || self.outbox.is_closed()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}

/// A logged-in connection waiting to be placed in the world
#[derive(Debug)]
pub struct Admission {
    pub username: String,
    pub window_mode: WindowMode,
    pub link: ClientLink,
}

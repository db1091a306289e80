//! Inbound message dispatch
//!
//! Malformed payloads and unknown opcodes are logged and dropped; processing
//! continues with the next frame.

use tracing::{debug, warn};

use crate::game::player::PlayerSession;
use crate::net::framing::Frame;
use crate::net::protocol::ClientMessage;

/// Outcome counts for one batch of frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub handled: usize,
    pub unknown: usize,
    pub malformed: usize,
}

impl std::ops::AddAssign for InboundStats {
    fn add_assign(&mut self, rhs: Self) {
        self.handled += rhs.handled;
        self.unknown += rhs.unknown;
        self.malformed += rhs.malformed;
    }
}

pub fn handle_frames(session: &mut PlayerSession, frames: Vec<Frame>) -> InboundStats {
    let mut stats = InboundStats::default();
    for frame in frames {
        match ClientMessage::decode(frame.opcode, &frame.payload) {
            Ok(Some(message)) => {
                handle_message(session, message);
                stats.handled += 1;
            }
            Ok(None) => {
                warn!(player = %session.id, opcode = frame.opcode, len = frame.payload.len(), "Unhandled message");
                stats.unknown += 1;
            }
            Err(e) => {
                warn!(player = %session.id, opcode = frame.opcode, error = %e, "Dropping malformed message");
                stats.malformed += 1;
            }
        }
    }
    stats
}

fn handle_message(session: &mut PlayerSession, message: ClientMessage) {
    match message {
        ClientMessage::CheatCommand { command, args } => match command.as_str() {
            "logout" => session.logout(),
            _ => debug!(player = %session.id, %command, ?args, "Unhandled command"),
        },
    }
}

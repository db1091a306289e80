//! One-shot UI messages sent to a session
//!
//! Every interface open consumes a verify id. All of these are flushed
//! immediately.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::game::constants::interfaces::*;
use crate::game::player::PlayerSession;
use crate::net::outbox::Delivery;
use crate::net::protocol::{ChatType, ServerMessage};

impl PlayerSession {
    fn send_message(&self, message: ServerMessage) {
        trace!(player = %self.id, opcode = message.opcode(), "Queue UI message");
        self.send(message.encode(), Delivery::Immediate);
    }

    /// Root interface for this session's window mode
    pub fn game_frame(&self) -> u16 {
        if self.window_mode.is_resizable() {
            GAME_FRAME_RESIZABLE
        } else {
            GAME_FRAME_FIXED
        }
    }

    pub fn open_game_frame(&mut self) {
        let verify = self.next_verify_id();
        self.send_message(ServerMessage::OpenTopLevel {
            interface: self.game_frame(),
            verify,
        });
    }

    pub fn open_interface(&mut self, window: u16, component: u16, interface: u16, flags: u8) {
        let verify = self.next_verify_id();
        self.send_message(ServerMessage::OpenSubInterface {
            window,
            component,
            interface,
            flags,
            verify,
        });
    }

    /// Chat options and chat box, plus the history pane on resizable layouts
    pub fn open_chat_box(&mut self) {
        let flags = DEFAULT_OPEN_FLAGS;
        if self.window_mode.is_resizable() {
            let frame = GAME_FRAME_RESIZABLE;
            self.open_interface(frame, RESIZABLE_CHAT_OPTIONS_COMPONENT, CHAT_OPTIONS, flags);
            self.open_interface(frame, RESIZABLE_CHAT_BOX_COMPONENT, CHAT_BOX, flags);
            self.open_interface(CHAT_BOX, CHAT_HISTORY_COMPONENT, CHAT_HISTORY, flags);
        } else {
            let frame = GAME_FRAME_FIXED;
            self.open_interface(frame, FIXED_CHAT_OPTIONS_COMPONENT, CHAT_OPTIONS, flags);
            self.open_interface(frame, FIXED_CHAT_BOX_COMPONENT, CHAT_BOX, flags);
        }
    }

    pub fn open_tab(&mut self, tab: u16, interface: u16) {
        let (frame, base) = if self.window_mode.is_resizable() {
            (GAME_FRAME_RESIZABLE, RESIZABLE_TAB_BASE)
        } else {
            (GAME_FRAME_FIXED, FIXED_TAB_BASE)
        };
        self.open_interface(frame, base + tab, interface, DEFAULT_OPEN_FLAGS);
    }

    pub fn open_default_tabs(&mut self) {
        for (tab, interface) in TABS {
            self.open_tab(tab, interface);
        }
    }

    pub fn message_game(&self, text: &str, kind: ChatType) {
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.send_message(ServerMessage::GameMessage {
            kind,
            text: text.to_string(),
            sender: None,
            sender_display: None,
            unix_secs,
        });
    }

    /// Tell the client to log out and mark the session for removal
    pub fn logout(&mut self) {
        self.send_message(ServerMessage::Logout);
        self.logout_requested = true;
    }
}

//! Message catalogue for the rt5 game protocol
//!
//! Server messages are encoded straight into a [`PacketBuffer`]; their field
//! orders and byte transforms are fixed by the client. Client messages are
//! decoded from an already framed `(opcode, payload)` pair.

use crate::net::buffer::PacketBuffer;
use crate::net::reader::{DecodeError, PacketReader};

/// Server -> client opcodes
pub mod server {
    pub const PLAYER_INFO: u8 = 72;
    pub const REBUILD_NORMAL: u8 = 98;
    pub const OPEN_TOP_LEVEL: u8 = 93;
    pub const OPEN_SUB_INTERFACE: u8 = 52;
    pub const GAME_MESSAGE: u8 = 99;
    pub const LOGOUT: u8 = 58;
}

/// Client -> server opcodes
pub mod client {
    /// First frame on a connection: `[window mode u8][username str]`
    pub const LOGIN: u8 = 16;
    /// `::command args` typed into the client console
    pub const CHEAT_COMMAND: u8 = 44;
}

/// Chat channel a game message is shown in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChatType {
    Game = 0,
    Public = 1,
    Trade = 4,
    PrivateTo = 6,
    PrivateFrom = 7,
    Assist = 10,
    DevConsole = 99,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Replace the root interface
    OpenTopLevel { interface: u16, verify: u16 },
    /// Mount `interface` on `window:component`
    OpenSubInterface {
        window: u16,
        component: u16,
        interface: u16,
        flags: u8,
        verify: u16,
    },
    /// Line in the chat box
    GameMessage {
        kind: ChatType,
        text: String,
        sender: Option<String>,
        sender_display: Option<String>,
        unix_secs: u32,
    },
    Logout,
}

impl ServerMessage {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::OpenTopLevel { .. } => server::OPEN_TOP_LEVEL,
            Self::OpenSubInterface { .. } => server::OPEN_SUB_INTERFACE,
            Self::GameMessage { .. } => server::GAME_MESSAGE,
            Self::Logout => server::LOGOUT,
        }
    }

    /// Encode into a fresh buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = PacketBuffer::new();
        buf.write_u8(self.opcode());

        match self {
            Self::OpenTopLevel { interface, verify } => {
                buf.write_u8(0);
                buf.write_u16_le(*interface);
                buf.write_u16_le(*verify);
            }
            Self::OpenSubInterface { window, component, interface, flags, verify } => {
                buf.write_u16_add(*verify);
                buf.write_u8_sub(*flags);
                buf.write_u16_le_add(*component);
                buf.write_u16_le_add(*window);
                buf.write_u16(*interface);
            }
            Self::GameMessage { kind, text, sender, sender_display, unix_secs } => {
                let size = buf.size_u8();
                buf.write_smart(*kind as u16);
                buf.write_u32(*unix_secs);

                let sender = sender.as_deref().filter(|s| !s.is_empty());
                let display = sender_display.as_deref().filter(|s| !s.is_empty());
                let more = sender.map_or(0, |_| 0x1) | display.map_or(0, |_| 0x2);
                buf.write_u8(more);
                if let Some(s) = sender {
                    buf.write_str(s);
                }
                if let Some(s) = display {
                    buf.write_str(s);
                }
                buf.write_str(text);
                buf.patch(size);
            }
            Self::Logout => {}
        }

        buf.into_bytes()
    }
}

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Console command, lowercased and split on spaces
    CheatCommand { command: String, args: Vec<String> },
}

impl ClientMessage {
    /// Decode one framed message. `Ok(None)` for opcodes this server ignores.
    pub fn decode(opcode: u8, payload: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut reader = PacketReader::new(payload);
        match opcode {
            client::CHEAT_COMMAND => {
                // Teleport-on-click flag, unused
                let _ = reader.read_u8()?;
                let line = reader.read_str()?.to_lowercase();
                let mut parts = line.split(' ').map(str::to_owned);
                let command = parts.next().unwrap_or_default();
                Ok(Some(Self::CheatCommand {
                    command,
                    args: parts.collect(),
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Opening frame of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub window_mode: u8,
    pub username: String,
}

impl LoginRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PacketReader::new(payload);
        let window_mode = reader.read_u8()?;
        let username = reader.read_str()?;
        Ok(Self { window_mode, username })
    }
}

pub mod buffer;
pub mod connection;
pub mod framing;
pub mod game_session;
pub mod outbox;
pub mod protocol;
pub mod reader;
pub mod transport;

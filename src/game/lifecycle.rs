//! Connection lifecycle
//!
//! A session enters `Unloaded`. On its first tick it moves through `Loading`
//! to `Loaded`, sending either a full map rebuild (first load) or a bare
//! position resync (resumed session) and, on first load, the base UI. Once
//! `Loaded`, [`advance`] is a no-op and the session receives player info
//! every tick.

use tracing::debug;

use crate::game::player::{LoadState, PlayerId, PlayerSession};
use crate::game::region_keys::RegionKeys;
use crate::net::buffer::PacketBuffer;
use crate::net::outbox::Delivery;
use crate::net::protocol::{server, ChatType};

/// Width of the low-resolution slot field sent for every other identity
const LOW_RES_BITS: u32 = 18;

/// Read-only inputs for loading a session
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub keys: &'a RegionKeys,
    pub welcome: &'a str,
}

/// What [`advance`] did this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already loaded
    Steady,
    /// Resumed session resynced
    Resynced,
    /// Fresh session initialized
    Initialized,
}

/// Run one lifecycle step for `session`
pub fn advance(session: &mut PlayerSession, ctx: &LoadContext<'_>) -> Transition {
    if session.state != LoadState::Unloaded {
        return Transition::Steady;
    }
    session.state = LoadState::Loading;

    let mut transition = Transition::Steady;
    if session.resuming {
        session.send(encode_resync(session), Delivery::Immediate);
        transition = Transition::Resynced;
    } else if session.first_load {
        session.send(encode_rebuild(session, ctx.keys), Delivery::Coalesced);
        transition = Transition::Initialized;
    }
    session.last_position = session.position;

    if session.first_load {
        session.open_game_frame();
        session.open_chat_box();
        session.open_default_tabs();
        if !session.resuming {
            session.message_game(ctx.welcome, ChatType::Game);
        }
    }

    session.first_load = false;
    session.state = LoadState::Loaded;
    debug!(
        player = %session.id,
        username = %session.username,
        ?transition,
        "Session loaded"
    );
    transition
}

/// Own high-res position followed by an empty slot for every other identity
fn write_initial_positions(buf: &mut PacketBuffer, session: &PlayerSession) {
    let mut bits = buf.bits();
    bits.write(30, session.position.high_res());
    for _ in PlayerId::all().filter(|id| *id != session.id) {
        bits.write(LOW_RES_BITS, 0);
    }
    bits.finish();
}

/// Position-only resync for a resumed session. Carries no opcode.
pub fn encode_resync(session: &PlayerSession) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    let size = buf.size_u16();
    write_initial_positions(&mut buf, session);
    buf.patch(size);
    buf.into_bytes()
}

/// Initial positions followed by the map rebuild around the session
pub fn encode_rebuild(session: &PlayerSession, keys: &RegionKeys) -> Vec<u8> {
    let pos = &session.position;
    let mut buf = PacketBuffer::new();
    buf.write_u8(server::REBUILD_NORMAL);
    let size = buf.size_u16();

    write_initial_positions(&mut buf, session);

    buf.write_u16_le(pos.zone_x() as u16);
    buf.write_u16(pos.zone_z() as u16);
    buf.write_u8(session.base_area.index);
    // Rebuild type: normal
    buf.write_u8_neg(0);

    for (x, z) in session.base_area.mapsquares(pos) {
        for word in keys.key_or_zero(x, z) {
            buf.write_u32(word);
        }
    }

    buf.patch(size);
    buf.into_bytes()
}

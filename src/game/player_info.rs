//! Per-tick player info encoding
//!
//! One message per loaded viewer:
//!
//! ```text
//! [72][size u16]
//!   active   entities, fresh last tick   (bits)
//!   active   entities, skipped last tick (bits)
//!   inactive slots,    fresh last tick   (bits)
//!   inactive slots,    skipped last tick (bits)
//!   update blocks                        (bytes)
//! ```
//!
//! Active entities are the viewer and the entities it tracks. Every other
//! identity slot is inactive and gets an explicit "no change". Each pass is
//! its own bit section, so passes start byte-aligned. The client remembers
//! which slots were left without an update in the previous message and
//! expects them in the second pass of each group; [`SyncState`] mirrors that.

use bitvec::prelude::*;
use smallvec::SmallVec;

use crate::game::appearance::AppearanceBlock;
use crate::game::constants::players::{MAX_PLAYERS, UPDATE_BLOCK_BUDGET, VIEW_DISTANCE};
use crate::game::player::{PlayerId, PlayerSession};
use crate::game::position::Position;
use crate::net::buffer::{BitWriter, PacketBuffer};
use crate::net::protocol::server;

/// Update block flag: appearance follows
pub const UPDATE_APPEARANCE: u8 = 0x1;

/// Movement type field value for "no movement"
const MOVEMENT_NONE: u32 = 0;

pub trait HasPosition {
    fn position(&self) -> Position;
}

pub trait HasAppearance {
    fn appearance(&self) -> Option<&AppearanceBlock>;
    /// Appearance must be sent to every viewer this tick
    fn appearance_changed(&self) -> bool;
}

pub trait NeedsSync {
    fn needs_sync(&self) -> bool;
}

/// Anything the encoder can describe to a viewer
pub trait SyncEntity: HasPosition + HasAppearance + NeedsSync {
    fn id(&self) -> PlayerId;
}

impl HasPosition for PlayerSession {
    fn position(&self) -> Position {
        self.position
    }
}

impl HasAppearance for PlayerSession {
    fn appearance(&self) -> Option<&AppearanceBlock> {
        self.appearance.as_ref()
    }

    fn appearance_changed(&self) -> bool {
        self.appearance_changed
    }
}

impl NeedsSync for PlayerSession {
    fn needs_sync(&self) -> bool {
        self.appearance_changed && self.appearance.is_some()
    }
}

impl SyncEntity for PlayerSession {
    fn id(&self) -> PlayerId {
        self.id
    }
}

type SlotFlags = BitArr!(for MAX_PLAYERS);

/// What a viewer's client is known to hold, per identity slot
#[derive(Debug, Clone)]
pub struct SyncState {
    /// Slots that went without an update in the last message
    skipped: SlotFlags,
    /// Slots whose current appearance the client has
    known: SlotFlags,
}

impl Default for SyncState {
    fn default() -> Self {
        Self { skipped: SlotFlags::ZERO, known: SlotFlags::ZERO }
    }
}

impl SyncState {
    pub fn was_skipped(&self, id: PlayerId) -> bool {
        self.skipped[id.index()]
    }

    pub fn knows_appearance(&self, id: PlayerId) -> bool {
        self.known[id.index()]
    }

    /// Forget everything, as for a fresh client
    pub fn reset(&mut self) {
        self.skipped = SlotFlags::ZERO;
        self.known = SlotFlags::ZERO;
    }
}

/// Encoded message and what went into it
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub bytes: Vec<u8>,
    /// Active entities flagged as updated
    pub updates: usize,
    /// Appearance blocks held back for a later message
    pub deferred: usize,
    /// Length of the trailing update-block segment
    pub block_len: usize,
}

fn in_view(viewer: &Position, other: &Position) -> bool {
    viewer
        .distance(other)
        .is_some_and(|d| d <= VIEW_DISTANCE)
}

/// Encode the player info message for `viewer`
///
/// `tracked` lists the entities the viewer follows in detail; ids that
/// `lookup` cannot resolve, and entities out of view, are written as
/// inactive. A tracked entity's appearance goes out when it changed or the
/// viewer has not been sent it yet, up to [`UPDATE_BLOCK_BUDGET`] bytes per
/// message. `state` is advanced to reflect this message.
pub fn encode<'a, E, F>(
    viewer: &'a E,
    tracked: &[PlayerId],
    lookup: F,
    state: &mut SyncState,
) -> PlayerInfo
where
    E: SyncEntity,
    F: Fn(PlayerId) -> Option<&'a E>,
{
    let viewer_id = viewer.id();
    let origin = viewer.position();

    let mut active: SmallVec<[&E; 32]> = SmallVec::new();
    active.push(viewer);
    active.extend(
        tracked
            .iter()
            .filter(|id| **id != viewer_id)
            .filter_map(|id| lookup(*id))
            .filter(|e| in_view(&origin, &e.position())),
    );
    active.sort_by_key(|e| e.id());
    active.dedup_by_key(|e| e.id());

    let mut is_active = SlotFlags::ZERO;
    for entity in &active {
        is_active.set(entity.id().index(), true);
    }

    let mut next = SyncState::default();
    let mut block = PacketBuffer::new();
    let mut updates = 0;
    let mut deferred = 0;

    let mut buf = PacketBuffer::new();
    buf.write_u8(server::PLAYER_INFO);
    let size = buf.size_u16();

    for skipped_pass in [false, true] {
        let mut bits = buf.bits();
        for entity in active.iter().filter(|e| state.skipped[e.id().index()] == skipped_pass) {
            let slot = entity.id().index();
            let written = write_active(&mut bits, &mut block, *entity, state.known[slot]);
            if written.updated {
                updates += 1;
            } else {
                next.skipped.set(slot, true);
            }
            deferred += written.deferred as usize;
            next.known.set(slot, written.known);
        }
        bits.finish();
    }

    for skipped_pass in [false, true] {
        let mut bits = buf.bits();
        for id in PlayerId::all() {
            let slot = id.index();
            if id == viewer_id || is_active[slot] || state.skipped[slot] != skipped_pass {
                continue;
            }
            bits.write_bool(false);
            bits.write(2, MOVEMENT_NONE);
            next.skipped.set(slot, true);
        }
        bits.finish();
    }

    let block_len = block.len();
    buf.write_bytes(block.as_bytes());
    buf.patch(size);
    *state = next;

    PlayerInfo { bytes: buf.into_bytes(), updates, deferred, block_len }
}

/// Outcome of writing one active entity
struct Written {
    updated: bool,
    /// Client holds the entity's current appearance afterwards
    known: bool,
    /// Appearance was due but did not fit this message
    deferred: bool,
}

fn write_active<E: SyncEntity>(
    bits: &mut BitWriter<'_>,
    block: &mut PacketBuffer,
    entity: &E,
    known: bool,
) -> Written {
    let due = entity
        .appearance()
        .filter(|_| !known || entity.appearance_changed());
    let appearance = due.filter(|a| block.len() + 2 + a.len() <= UPDATE_BLOCK_BUDGET);
    let deferred = due.is_some() && appearance.is_none();
    let known = appearance.is_some() || (known && !entity.appearance_changed());

    let needs_update = appearance.is_some() || entity.needs_sync();
    bits.write_bool(needs_update);
    if needs_update {
        bits.write_bool(appearance.is_some());
        bits.write(2, MOVEMENT_NONE);
    }

    if let Some(appearance) = appearance {
        append_update_block(block, appearance);
    }
    Written { updated: needs_update, known, deferred }
}

/// Flags byte, then the appearance length and its bytes in reverse order
pub fn append_update_block(block: &mut PacketBuffer, appearance: &AppearanceBlock) {
    let len = appearance.len();
    assert!(len <= u8::MAX as usize, "appearance block of {len} bytes");
    block.write_u8(UPDATE_APPEARANCE);
    block.write_u8_sub(len as u8);
    block.write_bytes_reversed(appearance.as_bytes());
}

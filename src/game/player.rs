//! Player identity and per-connection session state

use std::fmt;

use smallvec::SmallVec;

use crate::game::appearance::{AppearanceBlock, Looks};
use crate::game::constants::{map, players};
use crate::game::position::{BaseArea, Position};
use crate::net::connection::ClientLink;
use crate::net::outbox::Delivery;

/// Player identity, always within 1..=2047
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u16);

impl PlayerId {
    pub fn new(id: u16) -> Option<Self> {
        (players::FIRST_ID..=players::LAST_ID)
            .contains(&id)
            .then_some(Self(id))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Slot index into per-identity tables
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Every assignable identity in ascending order
    pub fn all() -> impl Iterator<Item = PlayerId> + Clone {
        (players::FIRST_ID..=players::LAST_ID).map(Self)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client window layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WindowMode {
    Fixed = 1,
    #[default]
    Resizable = 2,
    Fullscreen = 3,
}

impl WindowMode {
    /// Map the client's raw value; anything above 2 is fullscreen, below 2 fixed
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 | 1 => Self::Fixed,
            2 => Self::Resizable,
            _ => Self::Fullscreen,
        }
    }

    pub fn is_resizable(self) -> bool {
        self as u8 > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Entities a viewer currently tracks in detail (ascending ids, viewer excluded)
pub type TrackedList = SmallVec<[PlayerId; 32]>;

/// One connected player
#[derive(Debug)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub username: String,
    pub window_mode: WindowMode,
    verify_id: u16,

    pub position: Position,
    /// Position last sent to the client
    pub last_position: Position,
    pub base_area: BaseArea,

    pub looks: Looks,
    pub appearance: Option<AppearanceBlock>,
    /// Appearance was (re)built this tick and must be broadcast
    pub appearance_changed: bool,

    pub state: LoadState,
    pub first_load: bool,
    pub resuming: bool,

    pub tracked: TrackedList,
    pub link: ClientLink,
    pub logout_requested: bool,
}

impl PlayerSession {
    pub fn new(id: PlayerId, username: String, window_mode: WindowMode, link: ClientLink) -> Self {
        let (x, z, plane) = map::SPAWN;
        Self {
            id,
            username,
            window_mode,
            verify_id: 1,
            position: Position::new(x, z, plane),
            last_position: Position::default(),
            base_area: BaseArea::default(),
            looks: Looks::default(),
            appearance: None,
            appearance_changed: false,
            state: LoadState::Unloaded,
            first_load: true,
            resuming: false,
            tracked: TrackedList::new(),
            link,
            logout_requested: false,
        }
    }

    /// Stamp for the next UI-opening message
    pub fn next_verify_id(&mut self) -> u16 {
        let id = self.verify_id;
        self.verify_id = self.verify_id.wrapping_add(1);
        id
    }

    pub fn verify_id(&self) -> u16 {
        self.verify_id
    }

    pub fn send(&self, bytes: Vec<u8>, delivery: Delivery) {
        self.link.enqueue(bytes, delivery);
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// Drop the cached appearance so it is rebuilt and broadcast next tick
    pub fn invalidate_appearance(&mut self) {
        self.appearance = None;
    }

    /// Build the appearance block if none is cached. Returns true if built.
    pub fn prepare_appearance(&mut self) -> bool {
        if self.appearance.is_some() {
            return false;
        }
        self.appearance = Some(AppearanceBlock::encode(&self.username, &self.looks));
        self.appearance_changed = true;
        true
    }

    /// Reattach a new connection to this session
    pub fn resume(&mut self, link: ClientLink, window_mode: WindowMode) {
        self.link = link;
        self.window_mode = window_mode;
        self.state = LoadState::Unloaded;
        self.first_load = false;
        self.resuming = true;
        self.logout_requested = false;
    }

    /// Start tracking `other` in detail. Returns false once the list is full.
    pub fn track(&mut self, other: PlayerId) -> bool {
        if other == self.id {
            return true;
        }
        match self.tracked.binary_search(&other) {
            Ok(_) => true,
            Err(_) if self.tracked.len() >= players::MAX_TRACKED => false,
            Err(at) => {
                self.tracked.insert(at, other);
                true
            }
        }
    }

    pub fn untrack(&mut self, other: PlayerId) {
        if let Ok(at) = self.tracked.binary_search(&other) {
            self.tracked.remove(at);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::net::connection::LinkEnds;

    pub(crate) fn session(id: u16, name: &str, mode: WindowMode) -> (PlayerSession, LinkEnds) {
        let (link, ends) = ClientLink::pair("127.0.0.1:50000".parse().unwrap());
        let id = PlayerId::new(id).unwrap();
        (PlayerSession::new(id, name.to_string(), mode, link), ends)
    }

    #[test]
    fn test_player_id_range() {
        assert!(PlayerId::new(0).is_none());
        assert!(PlayerId::new(2048).is_none());
        assert_eq!(PlayerId::new(1).map(PlayerId::get), Some(1));
        assert_eq!(PlayerId::new(2047).map(PlayerId::index), Some(2047));
        assert_eq!(PlayerId::all().count(), 2047);
        assert_eq!(PlayerId::all().next(), PlayerId::new(1));
    }

    #[test]
    fn test_window_mode() {
        assert_eq!(WindowMode::from_raw(0), WindowMode::Fixed);
        assert_eq!(WindowMode::from_raw(2), WindowMode::Resizable);
        assert_eq!(WindowMode::from_raw(9), WindowMode::Fullscreen);
        assert!(!WindowMode::Fixed.is_resizable());
        assert!(WindowMode::Resizable.is_resizable());
        assert!(WindowMode::Fullscreen.is_resizable());
    }

    #[test]
    fn test_new_session_defaults() {
        let (session, _ends) = session(5, "bob", WindowMode::Resizable);
        assert_eq!(session.state, LoadState::Unloaded);
        assert!(session.first_load);
        assert!(!session.resuming);
        assert_eq!(session.position, Position::new(3162, 3490, 0));
        assert_eq!(session.verify_id(), 1);
        assert!(session.appearance.is_none());
    }

    #[test]
    fn test_verify_id_counts_up() {
        let (mut session, _ends) = session(1, "a", WindowMode::Fixed);
        assert_eq!(session.next_verify_id(), 1);
        assert_eq!(session.next_verify_id(), 2);
        assert_eq!(session.verify_id(), 3);
    }

    #[test]
    fn test_prepare_appearance_once() {
        let (mut session, _ends) = session(1, "a", WindowMode::Fixed);
        assert!(session.prepare_appearance());
        assert!(session.appearance_changed);
        session.appearance_changed = false;
        assert!(!session.prepare_appearance());
        assert!(!session.appearance_changed);

        session.invalidate_appearance();
        assert!(session.prepare_appearance());
        assert!(session.appearance_changed);
    }

    #[test]
    fn test_tracked_list_sorted_without_self() {
        let (mut session, _ends) = session(5, "a", WindowMode::Fixed);
        for id in [9, 3, 5, 7, 3] {
            session.track(PlayerId::new(id).unwrap());
        }
        let ids: Vec<u16> = session.tracked.iter().map(|id| id.get()).collect();
        assert_eq!(ids, vec![3, 7, 9]);
        session.untrack(PlayerId::new(7).unwrap());
        assert_eq!(session.tracked.len(), 2);
    }

    #[test]
    fn test_tracked_list_is_capped() {
        let (mut session, _ends) = session(1, "a", WindowMode::Fixed);
        let accepted = PlayerId::all()
            .skip(1)
            .take(300)
            .filter(|id| session.track(*id))
            .count();
        assert_eq!(accepted, players::MAX_TRACKED);
        assert_eq!(session.tracked.len(), players::MAX_TRACKED);

        // Already tracked ids and self are still fine
        assert!(session.track(PlayerId::new(2).unwrap()));
        assert!(session.track(PlayerId::new(1).unwrap()));
        session.untrack(PlayerId::new(2).unwrap());
        assert!(session.track(PlayerId::new(1000).unwrap()));
        assert!(session.tracked.contains(&PlayerId::new(1000).unwrap()));
    }

    #[test]
    fn test_resume_resets_lifecycle() {
        let (mut session, _old) = session(1, "a", WindowMode::Fixed);
        session.state = LoadState::Loaded;
        session.first_load = false;
        let (link, _ends) = ClientLink::pair("127.0.0.1:50001".parse().unwrap());
        session.resume(link, WindowMode::Fullscreen);
        assert_eq!(session.state, LoadState::Unloaded);
        assert!(session.resuming);
        assert!(!session.first_load);
        assert_eq!(session.window_mode, WindowMode::Fullscreen);
    }
}

//! Session registry and the per-tick driver
//!
//! `World` owns every connected [`PlayerSession`] in a table indexed by
//! identity, together with each viewer's [`SyncState`]. A tick runs in two
//! parallel phases: first every session handles its inbound frames and
//! advances its lifecycle (mutable, one unit per session), then every loaded
//! session encodes its player info against a read-only view of the table.
//! A panicking unit is caught, logged and its session dropped; other sessions
//! are unaffected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use rand::thread_rng;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::game::appearance::Looks;
use crate::game::commands::{self, InboundStats};
use crate::game::constants::players::MAX_PLAYERS;
use crate::game::lifecycle::{self, LoadContext, Transition};
use crate::game::player::{PlayerId, PlayerSession};
use crate::game::player_info::{self, SyncState};
use crate::game::position::BaseArea;
use crate::game::region_keys::RegionKeys;
use crate::net::connection::Admission;
use crate::net::outbox::Delivery;

/// Values applied to every new session
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub base_area_size: i32,
    pub welcome_message: String,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            base_area_size: crate::game::constants::map::BASE_AREA_SIZE,
            welcome_message: "Welcome to RuneScape.".to_string(),
        }
    }
}

/// Result of admitting a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    New(PlayerId),
    Resumed(PlayerId),
    /// Every identity is taken
    Full,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub sessions: usize,
    pub loaded: usize,
    pub initialized: usize,
    pub resynced: usize,
    pub player_info_sent: usize,
    pub bytes_sent: usize,
    pub appearance_updates: usize,
    pub inbound: InboundStats,
    pub failures: usize,
    pub removed: usize,
    pub duration: Duration,
}

/// Per-session outcome of the first phase
struct UnitOutcome {
    id: PlayerId,
    transition: Option<Transition>,
    inbound: InboundStats,
    failed: bool,
}

pub struct World {
    slots: Vec<Option<PlayerSession>>,
    sync: Vec<SyncState>,
    /// Lowercased username -> identity
    names: HashMap<String, PlayerId>,
    settings: WorldSettings,
    tick: u64,
}

impl World {
    pub fn new(settings: WorldSettings) -> Self {
        Self {
            slots: (0..MAX_PLAYERS).map(|_| None).collect(),
            sync: vec![SyncState::default(); MAX_PLAYERS],
            names: HashMap::new(),
            settings,
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerSession> {
        self.slots[id.index()].as_ref()
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSession> {
        self.slots[id.index()].as_mut()
    }

    pub fn find(&self, username: &str) -> Option<PlayerId> {
        self.names.get(&username.to_lowercase()).copied()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PlayerSession> {
        self.slots.iter().flatten()
    }

    /// Place a connection in the world, resuming an existing session with the same name
    pub fn admit(&mut self, admission: Admission) -> Admitted {
        let Admission { username, window_mode, link } = admission;
        let key = username.to_lowercase();

        if let Some(&id) = self.names.get(&key) {
            if let Some(session) = self.slots[id.index()].as_mut() {
                info!(player = %id, %username, addr = %link.remote_addr, "Resuming session");
                session.resume(link, window_mode);
                self.sync[id.index()].reset();
                return Admitted::Resumed(id);
            }
        }

        let Some(id) = PlayerId::all().find(|id| self.slots[id.index()].is_none()) else {
            warn!(%username, "World full, rejecting connection");
            return Admitted::Full;
        };

        let mut session = PlayerSession::new(id, username, window_mode, link);
        session.base_area = BaseArea::square(self.settings.base_area_size);
        session.looks = Looks::randomized(&mut thread_rng());
        info!(player = %id, username = %session.username, addr = %session.link.remote_addr, "Player joined");

        self.slots[id.index()] = Some(session);
        self.sync[id.index()].reset();
        self.names.insert(key, id);
        Admitted::New(id)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerSession> {
        let session = self.slots[id.index()].take()?;
        self.names.remove(&session.username.to_lowercase());
        self.sync[id.index()].reset();
        for other in self.slots.iter_mut().flatten() {
            other.untrack(id);
        }
        info!(
            player = %id,
            username = %session.username,
            online_secs = session.link.connected_at.elapsed().as_secs(),
            frames = session.link.frames_received(),
            "Player removed"
        );
        Some(session)
    }

    fn remove_where(&mut self, pred: impl Fn(&PlayerSession) -> bool) -> usize {
        let doomed: Vec<PlayerId> = self.sessions().filter(|s| pred(*s)).map(|s| s.id).collect();
        for id in &doomed {
            self.remove(*id);
        }
        doomed.len()
    }

    /// Run one game tick
    pub fn tick(&mut self, keys: &RegionKeys) -> TickReport {
        let started = Instant::now();
        self.tick += 1;
        let mut report = TickReport { tick: self.tick, ..Default::default() };

        report.removed += self.remove_where(|s| s.link.is_closed());

        let ctx = LoadContext { keys, welcome: &self.settings.welcome_message };
        let outcomes: Vec<UnitOutcome> = self
            .slots
            .par_iter_mut()
            .filter_map(Option::as_mut)
            .map(|session| run_session_unit(session, &ctx))
            .collect();

        let mut failed = Vec::new();
        for outcome in &outcomes {
            report.inbound += outcome.inbound;
            match outcome.transition {
                Some(Transition::Initialized) => report.initialized += 1,
                Some(Transition::Resynced) => report.resynced += 1,
                _ => {}
            }
            if outcome.failed {
                failed.push(outcome.id);
            }
        }
        report.failures += failed.len();
        for id in failed {
            self.remove(id);
            report.removed += 1;
        }
        report.removed += self.remove_where(|s| s.logout_requested);

        let (sent, encode_failures) = self.encode_player_info();
        report.player_info_sent = sent.len();
        report.bytes_sent = sent.iter().map(|(_, bytes, _)| *bytes).sum();
        report.appearance_updates = sent.iter().map(|(_, _, updates)| *updates).sum();
        report.failures += encode_failures.len();
        for id in encode_failures {
            self.remove(id);
            report.removed += 1;
        }

        for session in self.slots.iter_mut().flatten() {
            session.appearance_changed = false;
        }

        report.sessions = self.len();
        report.loaded = self.sessions().filter(|s| s.is_loaded()).count();
        report.duration = started.elapsed();
        debug!(
            tick = report.tick,
            sessions = report.sessions,
            sent = report.player_info_sent,
            bytes = report.bytes_sent,
            elapsed_us = report.duration.as_micros() as u64,
            "Tick complete"
        );
        report
    }

    /// Encode and queue player info for every loaded session.
    /// Returns (id, bytes, updates) per message sent and the ids that failed.
    fn encode_player_info(&mut self) -> (Vec<(PlayerId, usize, usize)>, Vec<PlayerId>) {
        let slots = &self.slots;
        let results: Vec<Result<(PlayerId, usize, usize), PlayerId>> = self
            .sync
            .par_iter_mut()
            .enumerate()
            .filter_map(|(index, state)| {
                let session = slots[index].as_ref().filter(|s| s.is_loaded())?;
                let lookup = |id: PlayerId| slots[id.index()].as_ref().filter(|s| s.is_loaded());
                let encoded = catch_unwind(AssertUnwindSafe(|| {
                    player_info::encode(session, &session.tracked, lookup, state)
                }));
                Some(match encoded {
                    Ok(info) => {
                        if info.deferred > 0 {
                            debug!(player = %session.id, deferred = info.deferred, "Appearance updates deferred");
                        }
                        let len = info.bytes.len();
                        session.send(info.bytes, Delivery::Immediate);
                        Ok((session.id, len, info.updates))
                    }
                    Err(_) => {
                        error!(player = %session.id, "Player info encoding panicked, disconnecting");
                        Err(session.id)
                    }
                })
            })
            .collect();

        let mut sent = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(entry) => sent.push(entry),
                Err(id) => failed.push(id),
            }
        }
        (sent, failed)
    }
}

/// Inbound handling, lifecycle and appearance preparation for one session
fn run_session_unit(session: &mut PlayerSession, ctx: &LoadContext<'_>) -> UnitOutcome {
    let id = session.id;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let frames = session.link.drain_inbound();
        let inbound = commands::handle_frames(session, frames);
        if session.logout_requested {
            return (None, inbound);
        }
        let transition = lifecycle::advance(session, ctx);
        if session.is_loaded() && session.prepare_appearance() {
            debug!(player = %session.id, "Appearance rebuilt");
        }
        (Some(transition), inbound)
    }));

    match result {
        Ok((transition, inbound)) => UnitOutcome { id, transition, inbound, failed: false },
        Err(_) => {
            error!(player = %id, "Session tick panicked, disconnecting");
            UnitOutcome { id, transition: None, inbound: InboundStats::default(), failed: true }
        }
    }
}

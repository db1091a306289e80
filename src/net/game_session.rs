//! Game loop
//!
//! `GameSession` owns the world for the lifetime of the server. New
//! connections arrive over a channel and are admitted at the start of each
//! tick, so the world is only ever touched from the tick task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::game::region_keys::RegionKeys;
use crate::game::world::{Admitted, TickReport, World};
use crate::metrics::Metrics;
use crate::net::connection::Admission;

pub struct GameSession {
    world: World,
    keys: Arc<RegionKeys>,
    admissions: Receiver<Admission>,
    metrics: Arc<Metrics>,
    tick_budget: Duration,
}

impl GameSession {
    pub fn new(
        world: World,
        keys: Arc<RegionKeys>,
        admissions: Receiver<Admission>,
        metrics: Arc<Metrics>,
        tick_budget: Duration,
    ) -> Self {
        Self { world, keys, admissions, metrics, tick_budget }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Place every waiting connection in the world
    pub fn admit_pending(&mut self) -> usize {
        let mut admitted = 0;
        for admission in self.admissions.try_iter() {
            if self.world.admit(admission) != Admitted::Full {
                admitted += 1;
            }
        }
        admitted
    }

    /// Admit waiting connections, then run one world tick
    pub fn tick(&mut self) -> TickReport {
        self.admit_pending();
        let report = self.world.tick(&self.keys);
        self.metrics.record_tick(&report, self.tick_budget);
        if report.duration > self.tick_budget {
            warn!(
                tick = report.tick,
                elapsed_ms = report.duration.as_millis() as u64,
                budget_ms = self.tick_budget.as_millis() as u64,
                "Tick overran its budget"
            );
        }
        report
    }
}

/// Run the tick loop on a tokio interval until the task is aborted
pub fn start_game_loop(mut session: GameSession) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tick_duration = session.tick_budget;
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("Game loop started, {} ms per tick", tick_duration.as_millis());
        let start = Instant::now();
        let ticks_per_minute = (60_000 / tick_duration.as_millis().max(1)) as u64;

        loop {
            ticker.tick().await;

            // The tick is CPU-bound and fans out over rayon
            let report = tokio::task::block_in_place(|| session.tick());

            if ticks_per_minute > 0 && report.tick % ticks_per_minute == 0 {
                info!(
                    "World: {}s, tick {}, {} sessions ({} loaded), {} bytes last tick, p99 {} us",
                    start.elapsed().as_secs(),
                    report.tick,
                    report.sessions,
                    report.loaded,
                    report.bytes_sent,
                    session
                        .metrics
                        .tick_time_p99_us
                        .load(std::sync::atomic::Ordering::Relaxed)
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::WindowMode;
    use crate::game::world::WorldSettings;
    use crate::net::connection::ClientLink;
    use std::sync::atomic::Ordering;

    fn game_session() -> (GameSession, crossbeam_channel::Sender<Admission>, Arc<Metrics>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let metrics = Arc::new(Metrics::new());
        let session = GameSession::new(
            World::new(WorldSettings::default()),
            Arc::new(RegionKeys::empty()),
            rx,
            metrics.clone(),
            Duration::from_millis(600),
        );
        (session, tx, metrics)
    }

    #[test]
    fn test_admissions_are_applied_on_tick() {
        let (mut session, tx, metrics) = game_session();
        let (link, mut ends) = ClientLink::pair("127.0.0.1:1".parse().unwrap());
        tx.send(Admission { username: "a".into(), window_mode: WindowMode::Fixed, link }).unwrap();

        let report = session.tick();
        assert_eq!(report.sessions, 1);
        assert_eq!(report.initialized, 1);
        assert_eq!(session.world().len(), 1);
        assert!(ends.outbound.try_recv().is_ok());

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.sessions_initialized.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.player_info_sent.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_empty_tick() {
        let (mut session, _tx, _metrics) = game_session();
        let report = session.tick();
        assert_eq!(report.tick, 1);
        assert_eq!(report.sessions, 0);
        assert_eq!(report.player_info_sent, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_game_loop_ticks() {
        let (tx, rx) = crossbeam_channel::unbounded::<Admission>();
        let metrics = Arc::new(Metrics::new());
        let session = GameSession::new(
            World::new(WorldSettings::default()),
            Arc::new(RegionKeys::empty()),
            rx,
            metrics.clone(),
            Duration::from_millis(10),
        );
        let handle = start_game_loop(session);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        drop(tx);
        assert!(metrics.tick_count.load(Ordering::Relaxed) >= 2);
    }
}

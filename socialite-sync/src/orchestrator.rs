//! Periodic refresh of the object graph.
//!
//! Three cadences run on independent jittered timers. Each refresh is a unit
//! of work on the request queue that owns its slice of the graph; a cadence
//! never has two refreshes in flight, so a tick that finds one running is
//! skipped. Connectivity is checked after every remote call and a refresh
//! abandons as soon as the session is offline.

use crate::config::{Cadence, OrchestratorConfig};
use crate::error::SyncResult;
use crate::events::{SyncCommand, SyncEvent};
use crate::graph::GraphStore;
use crate::worker::QueueKind;
use rand::Rng;
use socialite_types::EntityId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Whether a cadence has a refresh in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceState {
    Idle,
    Refreshing,
}

/// How a refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    /// The session went offline; merges applied so far were kept.
    Abandoned,
    /// Another refresh of the same cadence was in flight.
    Skipped,
}

/// The request queue that serves a cadence.
pub fn queue_for(cadence: Cadence) -> QueueKind {
    match cadence {
        Cadence::Dynamic => QueueKind::NewsFeed,
        Cadence::Moderate => QueueKind::FriendInfo,
        Cadence::Infrequent => QueueKind::PhotoInfo,
    }
}

/// Stretches or shrinks `base` by a random factor within `fraction`.
pub fn jittered(base: Duration, fraction: f64) -> Duration {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction == 0.0 {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-fraction..=fraction);
    base.mul_f64(factor)
}

/// Releases a cadence slot when dropped.
struct Claim {
    flag: Arc<[AtomicBool; 3]>,
    index: usize,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.flag[self.index].store(false, Ordering::Release);
    }
}

/// The session generation a refresh started under.
struct Run {
    generation: u64,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<GraphStore>,
    config: OrchestratorConfig,
    refreshing: Arc<[AtomicBool; 3]>,
    /// Generation whose quick feed pass has run.
    quick_pass: Arc<AtomicU64>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<GraphStore>) -> Self {
        let config = store.config().clone();
        Self {
            store,
            config,
            refreshing: Arc::new([AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)]),
            quick_pass: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self, cadence: Cadence) -> CadenceState {
        if self.refreshing[cadence as usize].load(Ordering::Acquire) {
            CadenceState::Refreshing
        } else {
            CadenceState::Idle
        }
    }

    fn claim(&self, cadence: Cadence) -> Option<Claim> {
        let index = cadence as usize;
        self.refreshing[index]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Claim {
                flag: self.refreshing.clone(),
                index,
            })
    }

    /// Queues a refresh of `cadence`. Returns false if one is already in
    /// flight.
    pub fn trigger(&self, cadence: Cadence) -> SyncResult<bool> {
        let Some(claim) = self.claim(cadence) else {
            debug!(?cadence, "refresh already in flight, skipping");
            return Ok(false);
        };
        let this = self.clone();
        self.store.queues().queue_request(
            queue_for(cadence),
            format!("refresh-{cadence:?}"),
            move || {
                let _claim = claim;
                this.run(cadence).map(|_| ())
            },
        )?;
        Ok(true)
    }

    /// Queues a refresh of every cadence.
    pub fn refresh_now(&self) -> SyncResult<()> {
        for cadence in Cadence::ALL {
            self.trigger(cadence)?;
        }
        Ok(())
    }

    /// Runs a refresh on the calling thread.
    pub fn refresh_blocking(&self, cadence: Cadence) -> SyncResult<RefreshOutcome> {
        let Some(_claim) = self.claim(cadence) else {
            return Ok(RefreshOutcome::Skipped);
        };
        self.run(cadence)
    }

    fn run(&self, cadence: Cadence) -> SyncResult<RefreshOutcome> {
        let session = self.store.session();
        let Ok(user_id) = session.require_online() else {
            debug!(?cadence, "offline, refresh abandoned");
            self.store.emit(SyncEvent::RefreshAbandoned { cadence });
            return Ok(RefreshOutcome::Abandoned);
        };
        let run = Run {
            generation: session.generation(),
        };

        self.store.emit(SyncEvent::RefreshStarted { cadence });
        let result = match cadence {
            Cadence::Dynamic => self.refresh_dynamic(&run),
            Cadence::Moderate => self.refresh_moderate(&run, &user_id),
            Cadence::Infrequent => self.refresh_infrequent(&run, &user_id),
        };
        match &result {
            Ok(RefreshOutcome::Abandoned) => {
                info!(?cadence, "session went offline, refresh abandoned");
                self.store.emit(SyncEvent::RefreshAbandoned { cadence });
            }
            Ok(_) => {
                debug!(?cadence, "refresh completed");
                self.store.emit(SyncEvent::RefreshCompleted { cadence });
            }
            Err(err) => {
                self.store.emit(SyncEvent::RefreshFailed {
                    cadence,
                    error: err.to_string(),
                });
            }
        }
        result
    }

    /// Runs `merge` for the run's session. False once that session has ended.
    fn apply<R>(&self, run: &Run, merge: impl FnOnce(&GraphStore) -> SyncResult<R>) -> SyncResult<bool> {
        Ok(self.store.ingest(run.generation, merge)?.is_some())
    }

    /// News feed (quick first pass once per session), then notifications.
    fn refresh_dynamic(&self, run: &Run) -> SyncResult<RefreshOutcome> {
        let service = self.store.service();

        if self.quick_pass.load(Ordering::Acquire) != run.generation {
            let posts = service.get_stream(None, self.config.quick_feed_count)?;
            if !self.apply(run, |store| store.merge_feed(posts))? {
                return Ok(RefreshOutcome::Abandoned);
            }
            self.quick_pass.store(run.generation, Ordering::Release);
        }

        let posts = service.get_stream(None, self.config.feed_count)?;
        if !self.apply(run, |store| store.merge_feed(posts))? {
            return Ok(RefreshOutcome::Abandoned);
        }

        let notifications = service.get_notifications(true)?;
        if !self.apply(run, |store| store.merge_notifications(notifications))? {
            return Ok(RefreshOutcome::Abandoned);
        }
        Ok(RefreshOutcome::Completed)
    }

    /// Own profile, friends, then stream filters.
    fn refresh_moderate(&self, run: &Run, user_id: &EntityId) -> SyncResult<RefreshOutcome> {
        let service = self.store.service();

        let me = service.get_user(user_id)?;
        if !self.apply(run, |store| store.merge_me(me))? {
            return Ok(RefreshOutcome::Abandoned);
        }

        let friends = service.get_friends(user_id)?;
        if !self.apply(run, |store| store.merge_friends(friends))? {
            return Ok(RefreshOutcome::Abandoned);
        }

        let filters = service.get_filters()?;
        if !self.apply(run, |store| store.merge_filters(filters))? {
            return Ok(RefreshOutcome::Abandoned);
        }
        Ok(RefreshOutcome::Completed)
    }

    /// Albums and photos of the user and the most interesting friends.
    fn refresh_infrequent(&self, run: &Run, user_id: &EntityId) -> SyncResult<RefreshOutcome> {
        let service = self.store.service();
        let mut owners = vec![user_id.clone()];
        owners.extend(
            self.store
                .friends()
                .ids()
                .into_iter()
                .filter(|id| !id.is_local())
                .take(self.config.interesting_people),
        );

        for owner in &owners {
            let albums = service.get_albums(owner)?;
            if !self.apply(run, |store| store.merge_albums(owner, albums))? {
                return Ok(RefreshOutcome::Abandoned);
            }

            for album in self.store.albums_of(owner) {
                let photos = service.get_photos(album.id(), self.config.photos_per_album)?;
                if !self.apply(run, |store| store.merge_photos(album.id(), photos))? {
                    return Ok(RefreshOutcome::Abandoned);
                }
            }
        }
        Ok(RefreshOutcome::Completed)
    }

    /// Starts the timer loop on `runtime`. Every cadence fires once right
    /// away, then on its jittered interval.
    pub fn start(self, runtime: &tokio::runtime::Handle) -> OrchestratorHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let store = self.store.clone();
        let task = runtime.spawn(self.run_loop(rx));
        OrchestratorHandle {
            commands,
            task,
            store,
        }
    }

    async fn run_loop(self, mut commands: mpsc::UnboundedReceiver<SyncCommand>) {
        let mut deadlines = [Instant::now(); 3];
        info!("sync orchestrator started");
        loop {
            let mut index = 0;
            for (i, deadline) in deadlines.iter().enumerate() {
                if *deadline < deadlines[index] {
                    index = i;
                }
            }
            let next = deadlines[index];

            tokio::select! {
                command = commands.recv() => match command {
                    Some(SyncCommand::RefreshAll) => {
                        for cadence in Cadence::ALL {
                            self.fire(cadence);
                        }
                    }
                    Some(SyncCommand::Refresh(cadence)) => self.fire(cadence),
                    Some(SyncCommand::Shutdown) | None => break,
                },
                _ = tokio::time::sleep_until(next) => {
                    let cadence = Cadence::ALL[index];
                    self.fire(cadence);
                    let interval = jittered(self.config.interval(cadence), self.config.jitter_fraction);
                    deadlines[index] = Instant::now() + interval;
                }
            }
        }
        info!("sync orchestrator stopped");
    }

    fn fire(&self, cadence: Cadence) {
        if !self.store.session().is_online() {
            debug!(?cadence, "offline, not refreshing");
            return;
        }
        if let Err(err) = self.trigger(cadence) {
            warn!(?cadence, error = %err, "could not queue refresh");
        }
    }
}

/// Control handle of a started orchestrator.
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    task: JoinHandle<()>,
    store: Arc<GraphStore>,
}

impl OrchestratorHandle {
    /// Refreshes every cadence now, outside the timers.
    pub fn refresh(&self) -> bool {
        self.commands.send(SyncCommand::RefreshAll).is_ok()
    }

    pub fn refresh_cadence(&self, cadence: Cadence) -> bool {
        self.commands.send(SyncCommand::Refresh(cadence)).is_ok()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.store.subscribe_events()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the timer loop. Refreshes already queued still run.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
        if let Err(err) = self.task.await {
            error!(error = %err, "orchestrator task failed");
        }
    }
}

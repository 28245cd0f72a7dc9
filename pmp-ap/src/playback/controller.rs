//! Crossfade controller - state machine and crossfade protocol
//!
//! **Responsibilities:**
//! - Cache the latest [`CrossfadeSettings`] pushed by the settings source
//! - Run the position monitor that decides when a crossfade starts
//! - Run the crossfade protocol over [`DualPlayerManager`] and [`VolumeAnimator`]
//! - Publish [`CrossfadeState`], the in-flight flag and [`CrossfadeEvent`]s
//!
//! **Protocol** (`perform_crossfade`):
//! 1. Reject while another crossfade is in flight (no completion callback)
//! 2. Complete directly when disabled or short on memory
//! 3. Mark in flight, stop the position monitor
//! 4. Prepare the standby slot, wait [`SETTLE_DELAY`], start it muted
//! 5. Ramp the current engine out and the standby engine in concurrently
//! 6. Join both ramps, swap slots, pause and restore the previous engine
//! 7. Publish `Completed`, invoke the completion callback
//!
//! Any failure in steps 4-5 restores the current engine to full volume,
//! resets the standby slot and still invokes the completion callback, so
//! the track change is never lost. Once step 6 swaps the slots the
//! crossfade counts as done: `stop_crossfade` leaves it alone and engine
//! errors are only logged. The in-flight flag and `Idle` state are
//! restored in every case.
//!
//! All tasks run inside the controller's cancellation scope; `release`
//! cancels it.

use super::dual_player::DualPlayerManager;
use super::engine::{EngineHandle, MediaItem};
use super::monitor::{PositionMonitor, PositionSample, POSITION_POLL_INTERVAL};
use super::state::{CrossfadeEvent, CrossfadeState, SkipReason};
use super::volume_animator::VolumeAnimator;
use crate::{Error, Result};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use pmp_common::CrossfadeSettings;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after preparing the standby engine so it can buffer before playing
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Volume every engine returns to when a crossfade ends or is abandoned
const FULL_VOLUME: f32 = 1.0;

/// Buffered crossfade events per subscriber
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Completion callback for a crossfade request
type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// The crossfade currently in flight
struct CrossfadeJob {
    /// Identifies this request; stale tasks compare against it before
    /// touching shared state
    generation: u64,
    token: CancellationToken,
    /// Set once the slots are swapped; a stop no longer undoes the job
    committed: bool,
}

/// A running position monitor loop
struct MonitorTask {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    /// Latest settings snapshot; every read site clones it once per operation
    settings: RwLock<CrossfadeSettings>,

    state_tx: watch::Sender<CrossfadeState>,

    /// In-flight flag; only written while holding `job`
    crossfading_tx: watch::Sender<bool>,

    events_tx: broadcast::Sender<CrossfadeEvent>,

    dual: Mutex<DualPlayerManager>,

    animator: VolumeAnimator,

    /// Parent of every task the controller spawns
    scope: CancellationToken,

    /// Gate for starting and finishing crossfades
    job: Mutex<Option<CrossfadeJob>>,

    next_generation: AtomicU64,

    monitor: Mutex<Option<MonitorTask>>,

    /// Nominal main engine, restored by `stop_crossfade`
    main_player: RwLock<Option<EngineHandle>>,

    /// Item the next automatic crossfade moves to
    next_item: Mutex<Option<MediaItem>>,

    released: AtomicBool,
}

/// Orchestrates crossfades between the main engine and the dual player slots
///
/// Cheap to clone; clones share the same state. Must be created inside a
/// tokio runtime.
#[derive(Clone)]
pub struct CrossfadeController {
    shared: Arc<Shared>,
}

impl CrossfadeController {
    /// Create a controller subscribed to `settings`
    ///
    /// The current value of the receiver is applied immediately; later
    /// updates are applied by a subscription task as they arrive.
    pub fn new(settings: watch::Receiver<CrossfadeSettings>, dual: DualPlayerManager) -> Self {
        let initial = settings.borrow().clone();
        let scope = CancellationToken::new();
        let initial_state = if initial.enabled {
            CrossfadeState::Idle
        } else {
            CrossfadeState::Disabled
        };

        let (state_tx, _) = watch::channel(initial_state);
        let (crossfading_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            settings: RwLock::new(initial),
            state_tx,
            crossfading_tx,
            events_tx,
            dual: Mutex::new(dual),
            animator: VolumeAnimator::with_parent(&scope),
            scope,
            job: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            monitor: Mutex::new(None),
            main_player: RwLock::new(None),
            next_item: Mutex::new(None),
            released: AtomicBool::new(false),
        });

        tokio::spawn(settings_subscription(Arc::downgrade(&shared), settings));
        info!("Crossfade controller created ({:?})", initial_state);

        Self { shared }
    }

    /// Snapshot of the cached settings
    pub fn settings(&self) -> CrossfadeSettings {
        self.shared.settings.read().clone()
    }

    pub fn state(&self) -> CrossfadeState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CrossfadeState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_crossfading(&self) -> bool {
        self.shared.is_crossfading()
    }

    pub fn subscribe_crossfading(&self) -> watch::Receiver<bool> {
        self.shared.crossfading_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CrossfadeEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Record the engine the playback layer currently plays through
    pub fn set_main_player(&self, engine: EngineHandle) {
        *self.shared.main_player.write() = Some(engine);
    }

    pub fn main_player(&self) -> Option<EngineHandle> {
        self.shared.main_player.read().clone()
    }

    /// Record the item the next automatic crossfade should move to
    pub fn set_next_media_item(&self, item: Option<MediaItem>) {
        *self.shared.next_item.lock() = item;
    }

    pub fn next_media_item(&self) -> Option<MediaItem> {
        self.shared.next_item.lock().clone()
    }

    /// The dual player's audible slot
    pub fn active_player(&self) -> Option<EngineHandle> {
        self.shared.dual.lock().active_player()
    }

    /// Whether the playback layer should cut directly between two tracks
    ///
    /// True only in album-continuous mode when both tracks name the same album.
    pub fn should_skip_crossfade(&self, current_album: Option<&str>, next_album: Option<&str>) -> bool {
        if !self.shared.settings.read().album_continuous {
            return false;
        }
        matches!((current_album, next_album), (Some(current), Some(next)) if current == next)
    }

    /// Start polling `engine` and call `on_trigger` when a crossfade is due
    ///
    /// Replaces any running monitor. Does nothing while crossfading is
    /// disabled; the loop also ends on its own when settings disable it.
    pub fn start_position_monitor<F>(&self, engine: EngineHandle, on_trigger: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop_position_monitor();

        if !self.shared.settings.read().enabled {
            debug!("Crossfade disabled, position monitor not started");
            return;
        }

        let token = self.shared.scope.child_token();
        let task = tokio::spawn(position_monitor_loop(
            Arc::downgrade(&self.shared),
            engine,
            token.clone(),
            on_trigger,
        ));
        *self.shared.monitor.lock() = Some(MonitorTask { token, task });
        debug!("Position monitor started");
    }

    pub fn stop_position_monitor(&self) {
        self.shared.stop_position_monitor();
    }

    /// Whether a position monitor loop is running
    pub fn is_monitoring(&self) -> bool {
        self.shared
            .monitor
            .lock()
            .as_ref()
            .is_some_and(|monitor| !monitor.task.is_finished())
    }

    /// Crossfade from `engine` into `next_item`
    ///
    /// Returns immediately; the crossfade runs as a task. `on_complete` is
    /// called exactly once for every accepted request, including skipped
    /// and failed ones. A request made while another crossfade is in flight
    /// is rejected and its callback is dropped uncalled.
    pub fn perform_crossfade<F>(&self, engine: EngineHandle, next_item: MediaItem, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        let settings = shared.settings.read().clone();

        let mut job = shared.job.lock();

        if *shared.crossfading_tx.borrow() {
            warn!("Crossfade already in progress, ignoring request for '{}'", next_item.id);
            shared.emit(CrossfadeEvent::Rejected {
                next_item_id: next_item.id,
                timestamp: Utc::now(),
            });
            return;
        }

        if !settings.enabled {
            debug!("Crossfade disabled, direct transition to '{}'", next_item.id);
            drop(job);
            shared.emit_skipped(next_item.id, SkipReason::Disabled);
            on_complete();
            return;
        }

        if !shared.dual.lock().has_enough_memory() {
            warn!("Insufficient memory for crossfade, direct transition to '{}'", next_item.id);
            drop(job);
            shared.emit_skipped(next_item.id, SkipReason::LowMemory);
            on_complete();
            return;
        }

        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = shared.scope.child_token();
        *job = Some(CrossfadeJob {
            generation,
            token: token.clone(),
            committed: false,
        });
        shared.crossfading_tx.send_replace(true);
        drop(job);

        shared.stop_position_monitor();

        info!(
            "Starting crossfade to '{}' ({}ms, {})",
            next_item.id, settings.duration_ms, settings.curve
        );
        tokio::spawn(run_crossfade(
            Arc::clone(shared),
            generation,
            token,
            engine,
            next_item,
            settings,
            Box::new(on_complete),
        ));
    }

    /// Crossfade from the main player into the recorded next item
    ///
    /// Returns `false` (and calls nothing) when either is missing.
    pub fn crossfade_to_next<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(engine) = self.main_player() else {
            warn!("No main player set, cannot crossfade");
            return false;
        };
        let Some(item) = self.shared.next_item.lock().take() else {
            warn!("No next media item set, cannot crossfade");
            return false;
        };

        self.perform_crossfade(engine, item, on_complete);
        true
    }

    /// Skip requested by the user
    ///
    /// Crossfades only when enabled and configured to apply on manual skips.
    pub fn handle_manual_skip<F>(&self, engine: EngineHandle, next_item: MediaItem, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let settings = self.shared.settings.read().clone();
        if !settings.enabled || !settings.apply_on_manual_skip {
            debug!("Manual skip to '{}' without crossfade", next_item.id);
            let reason = if settings.enabled {
                SkipReason::ManualSkip
            } else {
                SkipReason::Disabled
            };
            self.shared.emit_skipped(next_item.id, reason);
            on_complete();
            return;
        }

        self.perform_crossfade(engine, next_item, on_complete);
    }

    /// Abandon any in-flight crossfade and restore full volume
    ///
    /// Idempotent. The abandoned request still invokes its completion
    /// callback from its own task.
    pub fn stop_crossfade(&self) {
        self.shared.stop_crossfade();
    }

    /// Tear down: stop everything, release both engines, cancel all tasks
    pub fn release(&self) {
        if self.shared.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.stop_crossfade();
        self.shared.stop_position_monitor();
        self.shared.dual.lock().release();
        self.shared.scope.cancel();
        info!("Crossfade controller released");
    }
}

impl Shared {
    fn is_crossfading(&self) -> bool {
        *self.crossfading_tx.borrow()
    }

    fn emit(&self, event: CrossfadeEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn emit_skipped(&self, next_item_id: String, reason: SkipReason) {
        self.emit(CrossfadeEvent::Skipped {
            next_item_id,
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Publish `state` only if `generation` is still in flight
    fn publish_if_current(&self, generation: u64, state: CrossfadeState) {
        let job = self.job.lock();
        if job.as_ref().is_some_and(|job| job.generation == generation) {
            self.state_tx.send_replace(state);
        }
    }

    fn apply_settings(&self, settings: CrossfadeSettings) {
        let enabled = settings.enabled;
        *self.settings.write() = settings;

        if !enabled {
            self.stop_crossfade();
            self.stop_position_monitor();
            self.state_tx.send_replace(CrossfadeState::Disabled);
            info!("Crossfade disabled");
        } else {
            let reenabled = self.state_tx.send_if_modified(|state| {
                if *state == CrossfadeState::Disabled {
                    *state = CrossfadeState::Idle;
                    true
                } else {
                    false
                }
            });
            if reenabled {
                info!("Crossfade enabled");
            }
        }
    }

    fn stop_position_monitor(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.token.cancel();
            debug!("Position monitor stopped");
        }
    }

    fn stop_crossfade(&self) {
        let abandoned = {
            let mut job = self.job.lock();
            if job.as_ref().is_some_and(|job| job.committed) {
                debug!("Crossfade already swapped players, letting it finish");
                return;
            }
            let abandoned = job.take();
            if let Some(job) = &abandoned {
                job.token.cancel();
            }
            self.crossfading_tx.send_replace(false);
            abandoned
        };

        self.animator.cancel_all();
        self.state_tx.send_if_modified(|state| {
            if *state == CrossfadeState::Idle || *state == CrossfadeState::Disabled {
                false
            } else {
                *state = CrossfadeState::Idle;
                true
            }
        });

        if let Some(main) = self.main_player.read().as_ref() {
            if let Err(e) = main.set_volume(FULL_VOLUME) {
                warn!("Failed to restore main player volume: {}", e);
            }
        }

        {
            let mut dual = self.dual.lock();
            if let Err(e) = dual.set_active_volume(FULL_VOLUME) {
                warn!("Failed to restore active slot volume: {}", e);
            }
            if let Err(e) = dual.reset_standby_player() {
                warn!("Failed to reset standby slot: {}", e);
            }
        }

        if abandoned.is_some() {
            info!("Crossfade stopped");
            self.emit(CrossfadeEvent::Cancelled {
                timestamp: Utc::now(),
            });
        }
    }

    /// Clear the in-flight marker for `generation` and return to `Idle`
    fn finish(&self, generation: u64) {
        let mut job = self.job.lock();
        if !job.as_ref().is_some_and(|job| job.generation == generation) {
            // Already stopped; stop_crossfade restored flag and state
            return;
        }
        *job = None;
        self.crossfading_tx.send_replace(false);
        self.state_tx.send_if_modified(|state| {
            if *state == CrossfadeState::Disabled {
                false
            } else {
                *state = CrossfadeState::Idle;
                true
            }
        });
    }
}

/// Apply each settings update to the controller until it goes away
async fn settings_subscription(shared: Weak<Shared>, mut settings: watch::Receiver<CrossfadeSettings>) {
    let Some(scope) = shared.upgrade().map(|s| s.scope.clone()) else {
        return;
    };

    loop {
        tokio::select! {
            _ = scope.cancelled() => break,
            changed = settings.changed() => {
                if changed.is_err() {
                    debug!("Settings source closed");
                    break;
                }
                let snapshot = settings.borrow_and_update().clone();
                match shared.upgrade() {
                    Some(shared) => shared.apply_settings(snapshot),
                    None => break,
                }
            }
        }
    }
}

/// Poll `engine` until cancelled, disabled, or the controller is dropped
async fn position_monitor_loop<F>(
    shared: Weak<Shared>,
    engine: EngineHandle,
    token: CancellationToken,
    mut on_trigger: F,
) where
    F: FnMut() + Send + 'static,
{
    let mut interval = tokio::time::interval(POSITION_POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut monitor = PositionMonitor::new();

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let (crossfade_ms, sample) = {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let settings = shared.settings.read().clone();
            if !settings.enabled {
                debug!("Crossfade disabled, position monitor exiting");
                break;
            }
            (
                settings.duration_ms,
                PositionSample::from_engine(engine.as_ref(), shared.is_crossfading()),
            )
        };

        if monitor.poll(&sample, crossfade_ms) {
            info!(
                "Crossfade trigger at {}ms of {:?}ms",
                sample.position_ms, sample.duration_ms
            );
            on_trigger();
        }
    }
}

/// Task body for one accepted crossfade request
async fn run_crossfade(
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    engine: EngineHandle,
    next_item: MediaItem,
    settings: CrossfadeSettings,
    on_complete: OnComplete,
) {
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled("crossfade stopped".to_string())),
        result = crossfade_protocol(&shared, generation, &engine, &next_item, &settings) => result,
    };

    match result {
        Ok(()) => {
            shared.state_tx.send_if_modified(|state| {
                if *state == CrossfadeState::Disabled {
                    false
                } else {
                    *state = CrossfadeState::Completed;
                    true
                }
            });
            info!("Crossfade to '{}' completed", next_item.id);
            shared.emit(CrossfadeEvent::Completed {
                next_item_id: next_item.id.clone(),
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            match &e {
                Error::Cancelled(_) => info!("Crossfade to '{}' cancelled", next_item.id),
                _ => {
                    error!("Crossfade to '{}' failed: {}", next_item.id, e);
                    shared.emit(CrossfadeEvent::Failed {
                        next_item_id: next_item.id.clone(),
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
            recover(&shared, generation, &engine);
        }
    }

    on_complete();
    shared.finish(generation);
}

/// Steps 4-6 of the protocol; any error aborts into the recovery path
async fn crossfade_protocol(
    shared: &Arc<Shared>,
    generation: u64,
    engine: &EngineHandle,
    next_item: &MediaItem,
    settings: &CrossfadeSettings,
) -> Result<()> {
    {
        let mut dual = shared.dual.lock();
        dual.initialize()?;
        dual.prepare_next_track(next_item, 0)?;
    }

    shared.emit(CrossfadeEvent::Started {
        next_item_id: next_item.id.clone(),
        duration_ms: settings.duration_ms,
        curve: settings.curve,
        timestamp: Utc::now(),
    });

    tokio::time::sleep(SETTLE_DELAY).await;
    shared.dual.lock().start_standby_player()?;

    let start_volume = engine.volume();
    let levels = Arc::new(Mutex::new((start_volume, 0.0_f32)));
    let failure: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    let fade_out = {
        let owner = Arc::clone(shared);
        let engine = Arc::clone(engine);
        let levels = Arc::clone(&levels);
        let failure = Arc::clone(&failure);
        shared.animator.fade_out(
            settings.duration_ms,
            settings.curve,
            start_volume,
            move |volume| {
                if let Err(e) = engine.set_volume(volume) {
                    record_failure(&owner, &failure, e);
                    return;
                }
                let (fade_out_volume, fade_in_volume) = {
                    let mut levels = levels.lock();
                    levels.0 = volume;
                    *levels
                };
                publish_progress(&owner, generation, fade_out_volume, fade_in_volume);
            },
        )
    };

    let fade_in = {
        let owner = Arc::clone(shared);
        let levels = Arc::clone(&levels);
        let failure = Arc::clone(&failure);
        shared.animator.fade_in(
            settings.duration_ms,
            settings.curve,
            FULL_VOLUME,
            move |volume| {
                let applied = owner.dual.lock().set_standby_volume(volume);
                if let Err(e) = applied {
                    record_failure(&owner, &failure, e);
                    return;
                }
                let (fade_out_volume, fade_in_volume) = {
                    let mut levels = levels.lock();
                    levels.1 = volume;
                    *levels
                };
                publish_progress(&owner, generation, fade_out_volume, fade_in_volume);
            },
        )
    };

    let (fade_out_outcome, fade_in_outcome) = tokio::join!(fade_out.wait(), fade_in.wait());
    debug!(
        "Ramps finished: fade-out {:?}, fade-in {:?}",
        fade_out_outcome, fade_in_outcome
    );

    if let Some(e) = failure.lock().take() {
        return Err(e);
    }

    commit_swap(shared, generation, engine)
}

/// Swap the slots and hand the main player over to the incoming engine
///
/// Runs under `job` then `dual`, the order `perform_crossfade` takes them,
/// so a concurrent stop lands either before the swap or after the job is
/// marked committed. Nothing here awaits. Engine errors past the swap are
/// logged only: the incoming track is already playing at full volume.
fn commit_swap(shared: &Shared, generation: u64, engine: &EngineHandle) -> Result<()> {
    let mut job = shared.job.lock();
    match job.as_mut() {
        Some(current) if current.generation == generation => current.committed = true,
        _ => return Err(Error::Cancelled("crossfade superseded".to_string())),
    }

    let mut dual = shared.dual.lock();
    dual.swap_players();
    if let Some(active) = dual.active_player() {
        *shared.main_player.write() = Some(active);
    }

    if dual.is_standby(engine) {
        match dual.pause_standby_player() {
            Ok(()) => {
                if let Err(e) = dual.set_standby_volume(FULL_VOLUME) {
                    warn!("Failed to restore outgoing slot volume: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to pause outgoing slot, resetting it: {}", e);
                if let Err(e) = dual.reset_standby_player() {
                    warn!("Failed to reset outgoing slot: {}", e);
                }
            }
        }
        return Ok(());
    }
    drop(dual);
    drop(job);

    // The playback layer's own player, still playing silently after the ramp.
    // Left muted if it refuses to pause.
    match engine.pause() {
        Ok(()) => {
            if let Err(e) = engine.set_volume(FULL_VOLUME) {
                warn!("Failed to restore outgoing engine volume: {}", e);
            }
        }
        Err(e) => warn!("Failed to pause outgoing engine: {}", e),
    }
    Ok(())
}

/// Undo a crossfade that ended before the swap
///
/// Only the request that still owns the job, or one stopped with nothing
/// started after it, touches the engines; a newer crossfade may already
/// be ramping the same engine.
fn recover(shared: &Shared, generation: u64, engine: &EngineHandle) {
    let job = shared.job.lock();
    let owns_job = match job.as_ref() {
        Some(current) if current.generation == generation => true,
        Some(_) => return,
        None => false,
    };

    if let Err(e) = engine.set_volume(FULL_VOLUME) {
        warn!("Failed to restore volume after crossfade failure: {}", e);
    }
    // A stopped crossfade had its standby slot reset by stop_crossfade
    if owns_job {
        if let Err(e) = shared.dual.lock().reset_standby_player() {
            warn!("Failed to reset standby slot after crossfade failure: {}", e);
        }
    }
}

fn record_failure(shared: &Shared, failure: &Mutex<Option<Error>>, error: Error) {
    warn!("Volume update failed during crossfade: {}", error);
    let mut failure = failure.lock();
    if failure.is_none() {
        *failure = Some(error);
    }
    drop(failure);
    shared.animator.cancel_all();
}

fn publish_progress(shared: &Shared, generation: u64, fade_out_volume: f32, fade_in_volume: f32) {
    shared.publish_if_current(
        generation,
        CrossfadeState::Crossfading {
            progress: fade_in_volume,
            fade_out_volume,
            fade_in_volume,
        },
    );
}

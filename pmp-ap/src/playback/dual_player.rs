//! Dual player slot management
//!
//! **Responsibilities:**
//! - Own exactly two playback engine instances (slot 0 and slot 1)
//! - Track which slot is active (audible) and which is standby
//! - Prepare, start and reset the standby slot without disturbing the active one
//!
//! Roles derive from a single `active_index`; [`DualPlayerManager::swap_players`]
//! is the only operation that changes it. Slots are created in
//! [`DualPlayerManager::initialize`] and destroyed in
//! [`DualPlayerManager::release`], never by a swap.

use super::engine::{same_engine, EngineFactory, EngineHandle, EngineOptions, MediaItem};
use super::memory::{MemoryProbe, MIN_MEMORY_HEADROOM_BYTES};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner of the two crossfade engine slots
pub struct DualPlayerManager {
    /// Creates engines on first initialization
    factory: Arc<dyn EngineFactory>,

    /// Headroom source for the dual-engine fallback decision
    memory: Arc<dyn MemoryProbe>,

    /// Both slots are `Some` once initialized, both `None` otherwise
    slots: [Option<EngineHandle>; 2],

    /// Index of the audible slot (0 or 1)
    active_index: usize,
}

impl DualPlayerManager {
    pub fn new(factory: Arc<dyn EngineFactory>, memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            factory,
            memory,
            slots: [None, None],
            active_index: 0,
        }
    }

    /// Create both engines; no-op when already initialized
    ///
    /// Engines are built without exclusive audio focus so both can play at
    /// the same time during a crossfade.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let options = EngineOptions::non_exclusive();
        let first = self.factory.create(options)?;
        let second = match self.factory.create(options) {
            Ok(engine) => engine,
            Err(e) => {
                first.release();
                return Err(e);
            }
        };

        self.slots = [Some(first), Some(second)];
        self.active_index = 0;
        info!("Dual player initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    fn standby_index(&self) -> usize {
        1 - self.active_index
    }

    /// The audible engine, for the playback layer to take over after a swap
    pub fn active_player(&self) -> Option<EngineHandle> {
        self.slots[self.active_index].clone()
    }

    /// Whether `engine` is the current standby slot
    pub fn is_standby(&self, engine: &EngineHandle) -> bool {
        self.slots[self.standby_index()]
            .as_ref()
            .is_some_and(|standby| same_engine(standby, engine))
    }

    fn standby(&self) -> Result<&EngineHandle> {
        self.slots[self.standby_index()]
            .as_ref()
            .ok_or_else(|| Error::InvalidState("Dual player not initialized".to_string()))
    }

    /// Load `item` into the standby slot, muted and buffered but not playing
    pub fn prepare_next_track(&mut self, item: &MediaItem, start_position_ms: u64) -> Result<()> {
        let standby = self.standby()?;

        standby.stop()?;
        standby.clear_items()?;
        standby.set_media_item(item)?;
        standby.set_volume(0.0)?;
        standby.seek_to(start_position_ms)?;
        standby.prepare()?;

        debug!(
            "Prepared '{}' on standby slot {} at {}ms",
            item.id,
            self.standby_index(),
            start_position_ms
        );
        Ok(())
    }

    /// Begin playback on the standby slot at its current volume
    pub fn start_standby_player(&mut self) -> Result<()> {
        self.standby()?.play()?;
        debug!("Standby slot {} playing", self.standby_index());
        Ok(())
    }

    pub fn pause_standby_player(&mut self) -> Result<()> {
        self.standby()?.pause()
    }

    /// Exchange the active and standby roles
    ///
    /// Bookkeeping only; neither engine receives a transport command.
    pub fn swap_players(&mut self) {
        self.active_index = self.standby_index();
        debug!("Swapped players, active slot is now {}", self.active_index);
    }

    /// Stop, clear and mute the standby slot; no-op when not initialized
    pub fn reset_standby_player(&mut self) -> Result<()> {
        let Some(standby) = self.slots[self.standby_index()].as_ref() else {
            return Ok(());
        };

        standby.stop()?;
        standby.clear_items()?;
        standby.set_volume(0.0)?;
        Ok(())
    }

    /// Set the active slot's volume, clamped to [0, 1]
    pub fn set_active_volume(&mut self, volume: f32) -> Result<()> {
        match self.slots[self.active_index].as_ref() {
            Some(engine) => engine.set_volume(volume.clamp(0.0, 1.0)),
            None => Ok(()),
        }
    }

    /// Set the standby slot's volume, clamped to [0, 1]
    pub fn set_standby_volume(&mut self, volume: f32) -> Result<()> {
        match self.slots[self.standby_index()].as_ref() {
            Some(engine) => engine.set_volume(volume.clamp(0.0, 1.0)),
            None => Ok(()),
        }
    }

    /// Whether there is enough memory headroom to run two engines
    pub fn has_enough_memory(&self) -> bool {
        if self.memory.has_headroom(MIN_MEMORY_HEADROOM_BYTES) {
            return true;
        }
        warn!(
            "Low memory for dual playback: {} KB available, {} KB required",
            self.memory.available_bytes() / 1024,
            MIN_MEMORY_HEADROOM_BYTES / 1024
        );
        false
    }

    /// Release both engines and reset role tracking; safe to repeat
    pub fn release(&mut self) {
        let mut released = 0;
        for slot in self.slots.iter_mut() {
            if let Some(engine) = slot.take() {
                engine.release();
                released += 1;
            }
        }
        self.active_index = 0;

        if released > 0 {
            info!("Dual player released");
        }
    }
}

impl Drop for DualPlayerManager {
    fn drop(&mut self) {
        self.release();
    }
}

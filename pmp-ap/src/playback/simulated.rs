//! Clock-driven engine for running the crossfade engine without audio output
//!
//! Position advances with the tokio clock while playing, so simulated
//! playback follows paused-clock tests and real time alike.

use super::engine::{EngineFactory, EngineHandle, EngineOptions, MediaItem, PlaybackEngine};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct Transport {
    item: Option<MediaItem>,
    volume: f32,
    prepared: bool,
    /// Position when playback last started or was seeked
    base_position_ms: u64,
    /// Set while playing
    playing_since: Option<Instant>,
    has_next_item: bool,
    released: bool,
}

impl Transport {
    fn position_ms(&self) -> u64 {
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let position = self.base_position_ms + elapsed;
        match self.item.as_ref().and_then(|item| item.duration_ms) {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn ensure_live(&self, name: &str) -> Result<()> {
        if self.released {
            return Err(Error::Engine(format!("{}: engine released", name)));
        }
        Ok(())
    }
}

/// Engine that plays nothing but keeps transport state like a real player
#[derive(Debug)]
pub struct SimulatedEngine {
    name: String,
    options: EngineOptions,
    transport: Mutex<Transport>,
}

impl SimulatedEngine {
    pub fn new(name: impl Into<String>, options: EngineOptions) -> Self {
        Self {
            name: name.into(),
            options,
            transport: Mutex::new(Transport {
                volume: 1.0,
                ..Transport::default()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn current_item(&self) -> Option<MediaItem> {
        self.transport.lock().item.clone()
    }

    /// Tell the engine whether the playlist continues after this item
    pub fn set_has_next_item(&self, has_next: bool) {
        self.transport.lock().has_next_item = has_next;
    }

    /// Whether playback has reached the end of the loaded item
    pub fn is_ended(&self) -> bool {
        let transport = self.transport.lock();
        match transport.item.as_ref().and_then(|item| item.duration_ms) {
            Some(duration) => transport.position_ms() >= duration,
            None => false,
        }
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn play(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        if transport.item.is_none() {
            return Err(Error::Engine(format!("{}: nothing loaded", self.name)));
        }
        if transport.playing_since.is_none() {
            transport.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.base_position_ms = transport.position_ms();
        transport.playing_since = None;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.playing_since = None;
        transport.base_position_ms = 0;
        transport.prepared = false;
        Ok(())
    }

    fn seek_to(&self, position_ms: u64) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.base_position_ms = position_ms;
        if transport.playing_since.is_some() {
            transport.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn set_media_item(&self, item: &MediaItem) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        debug!("{}: loaded '{}'", self.name, item.id);
        transport.item = Some(item.clone());
        transport.base_position_ms = 0;
        transport.prepared = false;
        Ok(())
    }

    fn clear_items(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.item = None;
        transport.playing_since = None;
        transport.base_position_ms = 0;
        transport.prepared = false;
        Ok(())
    }

    fn prepare(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.prepared = transport.item.is_some();
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.transport.lock().volume
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        let mut transport = self.transport.lock();
        transport.ensure_live(&self.name)?;
        transport.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    fn current_position_ms(&self) -> u64 {
        self.transport.lock().position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        self.transport
            .lock()
            .item
            .as_ref()
            .and_then(|item| item.duration_ms)
    }

    fn is_playing(&self) -> bool {
        let transport = self.transport.lock();
        transport.playing_since.is_some()
            && !transport
                .item
                .as_ref()
                .and_then(|item| item.duration_ms)
                .is_some_and(|duration| transport.position_ms() >= duration)
    }

    fn has_next_item(&self) -> bool {
        self.transport.lock().has_next_item
    }

    fn release(&self) {
        let mut transport = self.transport.lock();
        if !transport.released {
            debug!("{}: released", self.name);
        }
        *transport = Transport {
            released: true,
            ..Transport::default()
        };
    }
}

/// Factory producing numbered [`SimulatedEngine`]s
///
/// Keeps every engine it created so the playlist state can be pushed to
/// all of them at once.
#[derive(Debug, Default)]
pub struct SimulatedEngineFactory {
    created: AtomicUsize,
    engines: Mutex<Vec<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn engines(&self) -> Vec<Arc<SimulatedEngine>> {
        self.engines.lock().clone()
    }

    /// Update the playlist continuation flag on every created engine
    pub fn set_has_next_item(&self, has_next: bool) {
        for engine in self.engines.lock().iter() {
            engine.set_has_next_item(has_next);
        }
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(&self, options: EngineOptions) -> Result<EngineHandle> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        let engine = Arc::new(SimulatedEngine::new(format!("slot-{}", index), options));
        self.engines.lock().push(Arc::clone(&engine));
        Ok(engine)
    }
}

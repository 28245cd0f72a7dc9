//! Recording playback engine for integration tests

use parking_lot::Mutex;
use pmp_ap::playback::{
    EngineFactory, EngineHandle, EngineOptions, MediaItem, MemoryProbe, PlaybackEngine,
};
use pmp_ap::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// A transport command received by a MockEngine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Play,
    Pause,
    Stop,
    SeekTo(u64),
    SetMediaItem(String),
    ClearItems,
    Prepare,
    SetVolume(f32),
    Release,
}

impl EngineCall {
    fn name(&self) -> &'static str {
        match self {
            EngineCall::Play => "play",
            EngineCall::Pause => "pause",
            EngineCall::Stop => "stop",
            EngineCall::SeekTo(_) => "seek_to",
            EngineCall::SetMediaItem(_) => "set_media_item",
            EngineCall::ClearItems => "clear_items",
            EngineCall::Prepare => "prepare",
            EngineCall::SetVolume(_) => "set_volume",
            EngineCall::Release => "release",
        }
    }
}

#[derive(Debug)]
struct MockState {
    calls: Vec<EngineCall>,
    volume: f32,
    playing: bool,
    position_ms: u64,
    duration_ms: Option<u64>,
    has_next_item: bool,
    failing: HashSet<&'static str>,
}

/// Engine that records commands instead of playing audio
#[derive(Debug)]
pub struct MockEngine {
    pub options: EngineOptions,
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            state: Mutex::new(MockState {
                calls: Vec::new(),
                volume: 1.0,
                playing: false,
                position_ms: 0,
                duration_ms: None,
                has_next_item: false,
                failing: HashSet::new(),
            }),
        }
    }

    /// A playing engine, like the playback layer's main player mid-track
    pub fn playing(position_ms: u64, duration_ms: u64) -> Arc<Self> {
        let engine = Arc::new(Self::new(EngineOptions::default()));
        {
            let mut state = engine.state.lock();
            state.playing = true;
            state.position_ms = position_ms;
            state.duration_ms = Some(duration_ms);
            state.has_next_item = true;
        }
        engine
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call_name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.name() == call_name)
            .count()
    }

    /// Volumes set on this engine, in order
    pub fn volume_history(&self) -> Vec<f32> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::SetVolume(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn current_volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn playing_now(&self) -> bool {
        self.state.lock().playing
    }

    /// Make every later call of `call_name` fail
    pub fn fail_on(&self, call_name: &'static str) {
        self.state.lock().failing.insert(call_name);
    }

    pub fn set_position_ms(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    fn record(&self, call: EngineCall) -> Result<()> {
        let mut state = self.state.lock();
        let name = call.name();
        let failing = state.failing.contains(name);
        state.calls.push(call.clone());
        if failing {
            return Err(Error::Engine(format!("injected {} failure", name)));
        }

        match call {
            EngineCall::Play => state.playing = true,
            EngineCall::Pause | EngineCall::Stop => state.playing = false,
            EngineCall::SeekTo(position) => state.position_ms = position,
            EngineCall::SetVolume(volume) => state.volume = volume,
            EngineCall::ClearItems => state.duration_ms = None,
            EngineCall::SetMediaItem(_) | EngineCall::Prepare | EngineCall::Release => {}
        }
        Ok(())
    }
}

impl PlaybackEngine for MockEngine {
    fn play(&self) -> Result<()> {
        self.record(EngineCall::Play)
    }

    fn pause(&self) -> Result<()> {
        self.record(EngineCall::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.record(EngineCall::Stop)
    }

    fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.record(EngineCall::SeekTo(position_ms))
    }

    fn set_media_item(&self, item: &MediaItem) -> Result<()> {
        self.record(EngineCall::SetMediaItem(item.id.clone()))?;
        self.state.lock().duration_ms = item.duration_ms;
        Ok(())
    }

    fn clear_items(&self) -> Result<()> {
        self.record(EngineCall::ClearItems)
    }

    fn prepare(&self) -> Result<()> {
        self.record(EngineCall::Prepare)
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.record(EngineCall::SetVolume(volume))
    }

    fn current_position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state.lock().duration_ms
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn has_next_item(&self) -> bool {
        self.state.lock().has_next_item
    }

    fn release(&self) {
        let _ = self.record(EngineCall::Release);
    }
}

/// Factory recording every engine it creates
#[derive(Debug, Default)]
pub struct MockEngineFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    fail_create: Mutex<bool>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engines(&self) -> Vec<Arc<MockEngine>> {
        self.engines.lock().clone()
    }

    pub fn engine(&self, index: usize) -> Arc<MockEngine> {
        self.engines.lock()[index].clone()
    }

    pub fn created_count(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn fail_create(&self) {
        *self.fail_create.lock() = true;
    }

    /// Total calls of `call_name` across all created engines
    pub fn total(&self, call_name: &str) -> usize {
        self.engines
            .lock()
            .iter()
            .map(|engine| engine.count(call_name))
            .sum()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, options: EngineOptions) -> Result<EngineHandle> {
        if *self.fail_create.lock() {
            return Err(Error::Engine("injected create failure".to_string()));
        }
        let engine = Arc::new(MockEngine::new(options));
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}

/// Memory probe reporting a fixed headroom
#[derive(Debug)]
pub struct MockMemoryProbe {
    available_bytes: u64,
}

impl MockMemoryProbe {
    pub fn new(available_bytes: u64) -> Self {
        Self { available_bytes }
    }
}

impl MemoryProbe for MockMemoryProbe {
    fn available_bytes(&self) -> u64 {
        self.available_bytes
    }
}

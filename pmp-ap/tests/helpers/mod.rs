//! Test helpers for pmp-ap integration tests
//!
//! - MockEngine: records every transport command, supports failure injection
//! - MockEngineFactory: hands out MockEngines and keeps them for inspection
//! - MockMemoryProbe: fixed memory headroom

#![allow(dead_code)]

pub mod mock_engine;

pub use mock_engine::{MockEngine, MockEngineFactory, MockMemoryProbe};

use pmp_ap::playback::MediaItem;
use pmp_ap::{CrossfadeController, DualPlayerManager};
use pmp_common::{CrossfadeSettings, SettingsStore};
use std::sync::Arc;

/// Plenty of headroom for dual playback
pub const AMPLE_MEMORY: u64 = 512 * 1024 * 1024;

pub fn track(id: &str) -> MediaItem {
    MediaItem::new(id, format!("file:///music/{}.flac", id)).with_duration_ms(180_000)
}

/// Controller over mock engines, with handles to everything a test inspects
pub struct Harness {
    pub store: SettingsStore,
    pub factory: Arc<MockEngineFactory>,
    pub controller: CrossfadeController,
}

impl Harness {
    pub fn new(settings: CrossfadeSettings) -> Self {
        Self::with_memory(settings, AMPLE_MEMORY)
    }

    pub fn with_memory(settings: CrossfadeSettings, available_bytes: u64) -> Self {
        let store = SettingsStore::new(settings).expect("valid settings");
        let factory = Arc::new(MockEngineFactory::new());
        let dual = DualPlayerManager::new(
            factory.clone(),
            Arc::new(MockMemoryProbe::new(available_bytes)),
        );
        let controller = CrossfadeController::new(store.subscribe(), dual);
        Self {
            store,
            factory,
            controller,
        }
    }
}

/// Settings with a short crossfade so tests stay quick under the paused clock
pub fn fast_settings() -> CrossfadeSettings {
    CrossfadeSettings {
        duration_ms: 1_000,
        ..CrossfadeSettings::default()
    }
}

//! Playback engine capability
//!
//! The crossfade engine only needs the transport surface of a player:
//! load/prepare/play/pause/seek and a volume control. Implementations use
//! interior mutability so a handle can be shared between the slot owner and
//! the tasks that ramp its volume.

use crate::Result;
use std::sync::Arc;

/// A playable track as seen by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Library identifier
    pub id: String,
    /// Location the engine loads from
    pub uri: String,
    pub title: Option<String>,
    /// Album identifier, used for album-continuous playback
    pub album: Option<String>,
    /// Known track length, if the library has scanned it
    pub duration_ms: Option<u64>,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            title: None,
            album: None,
            duration_ms: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Transport API of one playback engine instance
pub trait PlaybackEngine: Send + Sync {
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn seek_to(&self, position_ms: u64) -> Result<()>;
    fn set_media_item(&self, item: &MediaItem) -> Result<()>;
    fn clear_items(&self) -> Result<()>;

    /// Start buffering the loaded item without playing it
    fn prepare(&self) -> Result<()>;

    /// Current output volume (0.0-1.0)
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32) -> Result<()>;

    fn current_position_ms(&self) -> u64;

    /// Length of the loaded item; `None` while unknown
    fn duration_ms(&self) -> Option<u64>;

    fn is_playing(&self) -> bool;

    /// Whether the engine's own playlist has an item after the current one
    fn has_next_item(&self) -> bool;

    /// Free the engine's resources. Further commands may fail.
    fn release(&self);
}

/// Shared handle to a playback engine
pub type EngineHandle = Arc<dyn PlaybackEngine>;

/// Whether two handles refer to the same engine instance
pub fn same_engine(a: &EngineHandle, b: &EngineHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Construction options for engine instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Let the engine request exclusive audio focus and pause other players
    pub handle_audio_focus: bool,
}

impl EngineOptions {
    /// Options for engines that must play concurrently with another engine
    pub fn non_exclusive() -> Self {
        Self {
            handle_audio_focus: false,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            handle_audio_focus: true,
        }
    }
}

/// Creates engine instances for the dual player slots
pub trait EngineFactory: Send + Sync {
    fn create(&self, options: EngineOptions) -> Result<EngineHandle>;
}

//! Crossfade settings and the settings source
//!
//! `CrossfadeSettings` is an immutable snapshot. `SettingsStore` is the
//! push-based, latest-value source that the crossfade controller subscribes
//! to; readers always see a whole snapshot, never a partially updated one.

use crate::{Error, FadeCurve, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Default crossfade length in milliseconds
pub const DEFAULT_CROSSFADE_DURATION_MS: u64 = 5_000;

/// Shortest accepted crossfade length in milliseconds
pub const MIN_CROSSFADE_DURATION_MS: u64 = 1_000;

/// Longest accepted crossfade length in milliseconds
pub const MAX_CROSSFADE_DURATION_MS: u64 = 12_000;

/// User-facing crossfade preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfadeSettings {
    /// Master switch for crossfading
    pub enabled: bool,

    /// Length of the overlap between outgoing and incoming track
    pub duration_ms: u64,

    /// Envelope applied to both the fade-out and the fade-in
    pub curve: FadeCurve,

    /// Crossfade when the user skips to the next track
    pub apply_on_manual_skip: bool,

    /// Play consecutive tracks of the same album back to back without blending
    pub album_continuous: bool,

    /// Trim trailing silence before starting the fade
    ///
    /// Persisted for the playback layer; the transport-level engine has no
    /// sample access and does not act on it.
    pub silence_detection: bool,
}

impl Default for CrossfadeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: DEFAULT_CROSSFADE_DURATION_MS,
            curve: FadeCurve::default(),
            apply_on_manual_skip: true,
            album_continuous: true,
            silence_detection: false,
        }
    }
}

impl CrossfadeSettings {
    /// Settings with crossfading switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CROSSFADE_DURATION_MS..=MAX_CROSSFADE_DURATION_MS).contains(&self.duration_ms) {
            return Err(Error::InvalidInput(format!(
                "Crossfade duration {}ms outside {}..={}ms",
                self.duration_ms, MIN_CROSSFADE_DURATION_MS, MAX_CROSSFADE_DURATION_MS
            )));
        }
        Ok(())
    }
}

/// Latest-value source of [`CrossfadeSettings`]
///
/// Subscribers receive the current snapshot immediately and are woken on
/// every published change. Invalid settings are rejected before they reach
/// any subscriber.
#[derive(Debug)]
pub struct SettingsStore {
    tx: watch::Sender<CrossfadeSettings>,
}

impl SettingsStore {
    /// Create a store holding `initial`
    pub fn new(initial: CrossfadeSettings) -> Result<Self> {
        initial.validate()?;
        let (tx, _) = watch::channel(initial);
        Ok(Self { tx })
    }

    /// Snapshot of the current settings
    pub fn current(&self) -> CrossfadeSettings {
        self.tx.borrow().clone()
    }

    /// Subscribe to settings changes
    pub fn subscribe(&self) -> watch::Receiver<CrossfadeSettings> {
        self.tx.subscribe()
    }

    /// Replace the whole snapshot
    ///
    /// Returns `true` when subscribers were notified (the value changed).
    pub fn replace(&self, settings: CrossfadeSettings) -> Result<bool> {
        self.update(|current| *current = settings)
    }

    /// Modify the current snapshot in place and publish it if it changed
    pub fn update<F>(&self, modify: F) -> Result<bool>
    where
        F: FnOnce(&mut CrossfadeSettings),
    {
        let mut next = self.current();
        modify(&mut next);
        next.validate()?;

        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            debug!("Crossfade settings updated: {:?}", *self.tx.borrow());
        }
        Ok(changed)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        let (tx, _) = watch::channel(CrossfadeSettings::default());
        Self { tx }
    }
}

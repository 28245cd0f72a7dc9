//! Position monitoring for crossfade triggering
//!
//! Transport position is only observable by polling, so the controller
//! samples the active engine every [`POSITION_POLL_INTERVAL`] and feeds the
//! sample to a [`PositionMonitor`], which decides when the crossfade must
//! start for it to finish exactly as the current track would end.

use super::engine::PlaybackEngine;
use std::time::Duration;

/// Interval between position samples
pub const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Position at which a crossfade of `crossfade_ms` must start
///
/// `None` when the track is not longer than the crossfade.
pub fn trigger_position_ms(duration_ms: u64, crossfade_ms: u64) -> Option<u64> {
    duration_ms
        .checked_sub(crossfade_ms)
        .filter(|&position| position > 0)
}

/// One poll of the active engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSample {
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub has_next_item: bool,
    pub is_crossfading: bool,
}

impl PositionSample {
    pub fn from_engine(engine: &dyn PlaybackEngine, is_crossfading: bool) -> Self {
        Self {
            is_playing: engine.is_playing(),
            position_ms: engine.current_position_ms(),
            duration_ms: engine.duration_ms(),
            has_next_item: engine.has_next_item(),
            is_crossfading,
        }
    }
}

/// Trigger decision with once-per-approach latching
///
/// After firing, the monitor stays quiet until the position falls back
/// below the trigger point (a seek backwards) or a different track length
/// is observed.
#[derive(Debug, Default)]
pub struct PositionMonitor {
    fired: bool,
    last_duration_ms: Option<u64>,
}

impl PositionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the crossfade should start now
    pub fn poll(&mut self, sample: &PositionSample, crossfade_ms: u64) -> bool {
        if !sample.is_playing {
            return false;
        }
        let Some(duration_ms) = sample.duration_ms.filter(|&d| d > 0) else {
            return false;
        };

        if self.last_duration_ms != Some(duration_ms) {
            self.last_duration_ms = Some(duration_ms);
            self.fired = false;
        }

        let Some(trigger_ms) = trigger_position_ms(duration_ms, crossfade_ms) else {
            return false;
        };

        if sample.position_ms < trigger_ms {
            self.fired = false;
            return false;
        }

        if self.fired || !sample.has_next_item || sample.is_crossfading {
            return false;
        }

        self.fired = true;
        true
    }
}

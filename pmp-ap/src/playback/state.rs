//! Crossfade state and event types

use chrono::{DateTime, Utc};
use pmp_common::FadeCurve;

/// Observable state of the crossfade controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CrossfadeState {
    /// No crossfade running
    #[default]
    Idle,

    /// Both engines are ramping
    Crossfading {
        /// Overall progress (0.0-1.0), taken from the fade-in volume
        progress: f32,
        fade_out_volume: f32,
        fade_in_volume: f32,
    },

    /// A crossfade just finished; reverts to `Idle` right after
    Completed,

    /// Crossfading is switched off in the settings
    Disabled,
}

impl CrossfadeState {
    pub fn is_crossfading(&self) -> bool {
        matches!(self, CrossfadeState::Crossfading { .. })
    }

    /// Progress of the running crossfade, if any
    pub fn progress(&self) -> Option<f32> {
        match self {
            CrossfadeState::Crossfading { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

/// Why a crossfade request was turned into a direct transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Crossfading is switched off
    Disabled,
    /// Not enough memory headroom for two engines
    LowMemory,
    /// Manual skips are configured to cut directly
    ManualSkip,
}

/// Crossfade lifecycle notifications
#[derive(Debug, Clone)]
pub enum CrossfadeEvent {
    /// Standby engine prepared; ramps about to start
    Started {
        next_item_id: String,
        duration_ms: u64,
        curve: FadeCurve,
        timestamp: DateTime<Utc>,
    },

    /// Ramps finished and players swapped
    Completed {
        next_item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Request completed without a crossfade
    Skipped {
        next_item_id: String,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },

    /// Request ignored because another crossfade is in flight
    Rejected {
        next_item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Crossfade failed; volumes restored and playback continued directly
    Failed {
        next_item_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// In-flight crossfade stopped by `stop_crossfade`
    Cancelled { timestamp: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(CrossfadeState::default(), CrossfadeState::Idle);
    }

    #[test]
    fn test_progress_only_while_crossfading() {
        let state = CrossfadeState::Crossfading {
            progress: 0.4,
            fade_out_volume: 0.6,
            fade_in_volume: 0.4,
        };
        assert!(state.is_crossfading());
        assert_eq!(state.progress(), Some(0.4));

        assert_eq!(CrossfadeState::Completed.progress(), None);
        assert!(!CrossfadeState::Disabled.is_crossfading());
    }
}

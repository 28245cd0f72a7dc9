//! Crossfade playback subsystem
//!
//! Components, leaves first:
//! - [`volume_animator`]: envelope math and cancelable volume ramps
//! - [`dual_player`]: two engine slots with active/standby roles
//! - [`monitor`]: position polling and crossfade trigger decision
//! - [`controller`]: the crossfade state machine and protocol

pub mod controller;
pub mod dual_player;
pub mod engine;
pub mod memory;
pub mod monitor;
pub mod simulated;
pub mod state;
pub mod volume_animator;

pub use controller::CrossfadeController;
pub use dual_player::DualPlayerManager;
pub use engine::{EngineFactory, EngineHandle, EngineOptions, MediaItem, PlaybackEngine};
pub use memory::{MemoryProbe, SystemMemoryProbe, MIN_MEMORY_HEADROOM_BYTES};
pub use state::{CrossfadeEvent, CrossfadeState, SkipReason};
pub use volume_animator::{FadeHandle, FadeOutcome, VolumeAnimator};

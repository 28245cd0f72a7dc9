//! # PMP Audio Player Library (pmp-ap)
//!
//! Crossfade playback engine for the personal music player.
//!
//! **Purpose:** Blend the end of one track into the start of the next by
//! running two playback engines concurrently and ramping their volumes along
//! synchronized envelopes.
//!
//! **Architecture:** Transport-level control only. The engine drives two
//! [`playback::PlaybackEngine`] instances through play/pause/seek/volume and
//! never touches audio samples.

pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::{CrossfadeController, CrossfadeEvent, CrossfadeState, DualPlayerManager};

//! # PMP Common Library
//!
//! Shared code for the personal music player crates including:
//! - Error types
//! - Fade curve definitions and calculations
//! - Crossfade settings and the settings source
//! - Configuration file loading

pub mod config;
pub mod error;
pub mod fade_curves;
pub mod settings;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
pub use settings::{CrossfadeSettings, SettingsStore};

//! Fade curve implementations for crossfading
//!
//! Maps normalized fade progress (0.0 to 1.0) to a volume multiplier
//! (0.0 to 1.0). Every curve passes through (0, 0) and (1, 1); the shape
//! in between decides how the fade is perceived.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Envelope curve types for crossfading
///
/// - Linear: Constant rate of change (precise, predictable)
/// - Exponential: Slow start, fast finish
/// - SCurve: Smooth acceleration and deceleration (smoothstep)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Linear: v(t) = t
    Linear,

    /// Exponential: v(t) = t²
    Exponential,

    /// S-Curve: v(t) = 3t² - 2t³
    #[serde(alias = "scurve", alias = "s-curve")]
    SCurve,
}

impl FadeCurve {
    /// Calculate the volume multiplier at the given progress
    ///
    /// Progress is clamped to `[0.0, 1.0]` before the curve is applied, so
    /// out-of-range input saturates at the endpoints.
    ///
    /// # Arguments
    /// * `progress` - Normalized position through the fade (0.0 to 1.0)
    ///
    /// # Returns
    /// Volume multiplier (0.0 = silence, 1.0 = full volume)
    pub fn calculate_volume(&self, progress: f32) -> f32 {
        let t = progress.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            // Smoothstep polynomial
            FadeCurve::SCurve => t * t * (3.0 - 2.0 * t),
        }
    }

    /// Convert to the configuration file representation
    pub fn to_config_string(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::Exponential => "exponential",
            FadeCurve::SCurve => "s_curve",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Exponential => "Exponential",
            FadeCurve::SCurve => "S-Curve",
        }
    }

    /// Get all available fade curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[FadeCurve::Linear, FadeCurve::Exponential, FadeCurve::SCurve]
    }
}

/// Free-function form of [`FadeCurve::calculate_volume`]
pub fn calculate_volume(progress: f32, curve: FadeCurve) -> f32 {
    curve.calculate_volume(progress)
}

impl Default for FadeCurve {
    /// S-Curve gives the gentlest transition between tracks
    fn default() -> Self {
        FadeCurve::SCurve
    }
}

impl FromStr for FadeCurve {
    type Err = crate::Error;

    /// Parse curve from a configuration value
    ///
    /// Accepts `linear`, `exponential` and `s_curve` (with `scurve` and
    /// `s-curve` as aliases), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "exponential" => Ok(FadeCurve::Exponential),
            "s_curve" | "scurve" | "s-curve" => Ok(FadeCurve::SCurve),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown fade curve: {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

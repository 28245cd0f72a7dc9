//! Volume ramps for crossfading
//!
//! A ramp is a tokio task that emits volume values through a callback at a
//! fixed step schedule. Ramps are cancelled cooperatively: the task checks
//! its token between steps, and a cancelled ramp stops emitting without
//! forcing a final value. Restoring a sane volume after cancellation is the
//! caller's job.
//!
//! Each animator runs at most one fade-out and one fade-in at a time;
//! starting a new ramp in a direction cancels the previous one.

use parking_lot::Mutex;
use pmp_common::FadeCurve;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Target spacing between volume updates
pub const STEP_INTERVAL_MS: u64 = 50;

/// Minimum number of volume updates per ramp
pub const MIN_STEPS: u64 = 10;

/// Step count and inter-step delay for a ramp of `duration_ms`
pub fn fade_steps(duration_ms: u64) -> (u64, Duration) {
    let steps = (duration_ms / STEP_INTERVAL_MS).max(MIN_STEPS);
    (steps, Duration::from_millis(duration_ms / steps))
}

/// How a ramp ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// All steps ran and the final value was emitted
    Completed,
    /// Stopped early; no final value was emitted
    Cancelled,
}

/// Handle to a running ramp
#[derive(Debug)]
pub struct FadeHandle {
    token: CancellationToken,
    task: JoinHandle<FadeOutcome>,
}

impl FadeHandle {
    /// Request cancellation; the ramp stops before its next emission
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the ramp to complete or observe its cancellation
    pub async fn wait(self) -> FadeOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    warn!("Volume ramp task panicked: {}", e);
                }
                FadeOutcome::Cancelled
            }
        }
    }
}

/// Drives fade-out and fade-in volume ramps
#[derive(Debug, Default)]
pub struct VolumeAnimator {
    /// Parent for every ramp token; cancelling it stops all ramps for good
    scope: CancellationToken,
    fade_out: Mutex<Option<CancellationToken>>,
    fade_in: Mutex<Option<CancellationToken>>,
}

impl VolumeAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an animator whose ramps are also cancelled with `parent`
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            scope: parent.child_token(),
            fade_out: Mutex::new(None),
            fade_in: Mutex::new(None),
        }
    }

    /// Ramp from `start_volume` down to silence over `duration_ms`
    ///
    /// At step `i` of `n` the emitted volume is
    /// `start_volume * (1 - curve(i / n))`. A final `0.0` is emitted unless
    /// the ramp is cancelled.
    pub fn fade_out<F>(
        &self,
        duration_ms: u64,
        curve: FadeCurve,
        start_volume: f32,
        on_volume_change: F,
    ) -> FadeHandle
    where
        F: FnMut(f32) + Send + 'static,
    {
        let token = Self::replace_token(&self.fade_out, &self.scope);
        let (steps, step_delay) = fade_steps(duration_ms);
        debug!(
            "Fade-out: {}ms, {} steps of {:?}, curve {}, from {:.3}",
            duration_ms, steps, step_delay, curve, start_volume
        );

        let task = tokio::spawn(run_ramp(
            token.clone(),
            steps,
            step_delay,
            move |progress| start_volume * (1.0 - curve.calculate_volume(progress)),
            0.0,
            on_volume_change,
        ));

        FadeHandle { token, task }
    }

    /// Ramp from silence up to `target_volume` over `duration_ms`
    ///
    /// The first emission is `0.0`; the final emission is exactly
    /// `target_volume` unless the ramp is cancelled.
    pub fn fade_in<F>(
        &self,
        duration_ms: u64,
        curve: FadeCurve,
        target_volume: f32,
        on_volume_change: F,
    ) -> FadeHandle
    where
        F: FnMut(f32) + Send + 'static,
    {
        let token = Self::replace_token(&self.fade_in, &self.scope);
        let (steps, step_delay) = fade_steps(duration_ms);
        debug!(
            "Fade-in: {}ms, {} steps of {:?}, curve {}, to {:.3}",
            duration_ms, steps, step_delay, curve, target_volume
        );

        let task = tokio::spawn(run_ramp(
            token.clone(),
            steps,
            step_delay,
            move |progress| target_volume * curve.calculate_volume(progress),
            target_volume.clamp(0.0, 1.0),
            on_volume_change,
        ));

        FadeHandle { token, task }
    }

    pub fn cancel_fade_out(&self) {
        if let Some(token) = self.fade_out.lock().take() {
            token.cancel();
        }
    }

    pub fn cancel_fade_in(&self) {
        if let Some(token) = self.fade_in.lock().take() {
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        self.cancel_fade_out();
        self.cancel_fade_in();
    }

    /// Cancel the ramp stored in `slot` and register a fresh token
    fn replace_token(
        slot: &Mutex<Option<CancellationToken>>,
        scope: &CancellationToken,
    ) -> CancellationToken {
        let token = scope.child_token();
        if let Some(previous) = slot.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

/// Emit `volume_at(i / steps)` for each step, then `final_volume`
async fn run_ramp<V, F>(
    token: CancellationToken,
    steps: u64,
    step_delay: Duration,
    volume_at: V,
    final_volume: f32,
    mut on_volume_change: F,
) -> FadeOutcome
where
    V: Fn(f32) -> f32,
    F: FnMut(f32),
{
    for step in 0..steps {
        if token.is_cancelled() {
            return FadeOutcome::Cancelled;
        }

        let progress = step as f32 / steps as f32;
        on_volume_change(volume_at(progress).clamp(0.0, 1.0));

        tokio::select! {
            biased;
            _ = token.cancelled() => return FadeOutcome::Cancelled,
            _ = tokio::time::sleep(step_delay) => {}
        }
    }

    if token.is_cancelled() {
        return FadeOutcome::Cancelled;
    }
    on_volume_change(final_volume);
    FadeOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_steps_schedule() {
        assert_eq!(fade_steps(1000), (20, Duration::from_millis(50)));
        assert_eq!(fade_steps(5000), (100, Duration::from_millis(50)));
    }

    #[test]
    fn test_short_fades_use_minimum_steps() {
        assert_eq!(fade_steps(200), (10, Duration::from_millis(20)));
        assert_eq!(fade_steps(0), (10, Duration::ZERO));
    }
}

//! Smooth display position between discrete GPS updates.
//!
//! Each time the target changes, the displayed position glides from where
//! it currently is to the new target over a fixed wall-clock duration,
//! independent of frame rate. The animation advances on display frames
//! requested through a [`FrameScheduler`]; at most one frame request is
//! pending per interpolator.

use serde::{Deserialize, Serialize};

use crate::Coordinates;

/// Easing curve applied to interpolation progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseOutQuad,
    EaseInOutQuad,
    EaseOutCubic,
    /// Caller-provided curve mapping [0, 1] onto [0, 1]
    #[serde(skip)]
    Custom(fn(f64) -> f64),
}

impl Easing {
    /// Apply the curve. Input is clamped to [0, 1].
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseOutQuad => t * (2.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::EaseOutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Easing::Custom(f) => f(t),
        }
    }
}

/// Configuration for position interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Time to glide from one position to the next (milliseconds).
    /// Default: 1000
    pub duration_ms: u64,

    /// Easing curve. Default: linear
    pub easing: Easing,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            easing: Easing::Linear,
        }
    }
}

/// Identifier of a requested display frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Per-frame callback scheduling (requestAnimationFrame, vsync, a UI tick).
///
/// The host calls [`PositionInterpolator::on_frame`] with the id it handed
/// out once that frame fires.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameId;
    fn cancel_frame(&mut self, id: FrameId);
}

impl<T: FrameScheduler + ?Sized> FrameScheduler for Box<T> {
    fn request_frame(&mut self) -> FrameId {
        (**self).request_frame()
    }

    fn cancel_frame(&mut self, id: FrameId) {
        (**self).cancel_frame(id)
    }
}

#[derive(Debug, Clone, Copy)]
struct Animation {
    from: Coordinates,
    to: Coordinates,
    started_at_ms: u64,
}

/// Frame-driven interpolator for the displayed position.
#[derive(Debug)]
pub struct PositionInterpolator<S: FrameScheduler> {
    scheduler: S,
    config: InterpolationConfig,
    displayed: Option<Coordinates>,
    animation: Option<Animation>,
    pending_frame: Option<FrameId>,
}

impl<S: FrameScheduler> PositionInterpolator<S> {
    pub fn new(scheduler: S, config: InterpolationConfig) -> Self {
        Self {
            scheduler,
            config,
            displayed: None,
            animation: None,
            pending_frame: None,
        }
    }

    /// Currently displayed position.
    pub fn displayed(&self) -> Option<Coordinates> {
        self.displayed
    }

    /// True while a frame is pending.
    pub fn is_animating(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Change the target position.
    ///
    /// - `None` clears the display and halts the animation immediately.
    /// - The first target after a clear is displayed immediately.
    /// - Later targets start a new glide from the currently displayed
    ///   position, abandoning any glide in progress.
    pub fn set_target(&mut self, target: Option<Coordinates>, now_ms: u64) -> Option<Coordinates> {
        self.cancel_pending();

        let Some(target) = target else {
            self.animation = None;
            self.displayed = None;
            return None;
        };

        let Some(from) = self.displayed else {
            self.animation = None;
            self.displayed = Some(target);
            return self.displayed;
        };

        if from == target {
            self.animation = None;
            return self.displayed;
        }

        self.animation = Some(Animation { from, to: target, started_at_ms: now_ms });
        self.pending_frame = Some(self.scheduler.request_frame());
        self.displayed
    }

    /// Advance the animation for a fired frame.
    ///
    /// Frames other than the one currently pending are stale and ignored.
    pub fn on_frame(&mut self, frame: FrameId, now_ms: u64) -> Option<Coordinates> {
        if self.pending_frame != Some(frame) {
            return self.displayed;
        }
        self.pending_frame = None;

        let Some(animation) = self.animation else {
            return self.displayed;
        };

        let elapsed = now_ms.saturating_sub(animation.started_at_ms);
        let progress = if self.config.duration_ms == 0 {
            1.0
        } else {
            (elapsed as f64 / self.config.duration_ms as f64).min(1.0)
        };

        let eased = self.config.easing.apply(progress);
        self.displayed = Some(lerp(&animation.from, &animation.to, eased));

        if progress < 1.0 {
            self.pending_frame = Some(self.scheduler.request_frame());
        } else {
            self.displayed = Some(animation.to);
            self.animation = None;
        }

        self.displayed
    }

    fn cancel_pending(&mut self) {
        if let Some(frame) = self.pending_frame.take() {
            self.scheduler.cancel_frame(frame);
        }
    }
}

#[inline]
fn lerp(a: &Coordinates, b: &Coordinates, t: f64) -> Coordinates {
    Coordinates::new(
        a.longitude + (b.longitude - a.longitude) * t,
        a.latitude + (b.latitude - a.latitude) * t,
    )
}

//! Linear parameter ramps evaluated on the render thread.
//!
//! A [`RampedParam`] holds the value the render thread currently sees plus at most one
//! in-flight ramp. Ramps are described in frames so the render clock, not wall time,
//! decides where a ramp is.

/// A parameter with an optional in-flight linear ramp.
#[derive(Debug, Clone, Copy)]
pub struct RampedParam {
    current: f32,
    target: f32,
    /// Change per frame while ramping.
    step: f32,
    /// Frames left until `current == target`.
    remaining: u32,
}

impl RampedParam {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Value at the current render position.
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Resting value once the ramp (if any) completes.
    #[cfg(test)]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Starts a ramp from the current value to `target` over `frames`.
    ///
    /// Any in-flight ramp is replaced. A zero-length ramp jumps immediately and a ramp to
    /// the current value leaves the parameter at rest.
    pub fn ramp_to(&mut self, target: f32, frames: u32) {
        if !target.is_finite() {
            return;
        }

        if frames == 0 || target == self.current {
            self.current = target;
            self.target = target;
            self.step = 0.0;
            self.remaining = 0;
            return;
        }

        self.target = target;
        self.step = (target - self.current) / frames as f32;
        self.remaining = frames;
    }

    /// Advances the render position by `frames`, returning the value at the start of
    /// the span (k-rate sampling).
    pub fn advance(&mut self, frames: u32) -> f32 {
        let value = self.current;
        if self.remaining == 0 {
            return value;
        }

        if frames >= self.remaining {
            self.current = self.target;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.remaining -= frames;
            // Measured back from the target so the endpoint is exact.
            self.current = self.target - self.step * self.remaining as f32;
        }

        value
    }

    /// Per-sample (a-rate) evaluation.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        self.advance(1)
    }
}

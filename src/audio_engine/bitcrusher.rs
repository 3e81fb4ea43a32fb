//! Bit-depth and sample-rate reduction.
//!
//! This is the sampler's characteristic coloration: each channel is sample-and-held over
//! `reduction` frames, the held value is quantized onto `2^bit_depth` floor-biased levels,
//! and the result is blended back with the dry signal.
//!
//! [`Bitcrusher::process`] runs on the render thread. It never allocates and never
//! panics; anything it cannot process comes out as silence.

use crate::audio_engine::constants::{
    BIT_DEPTH_MAX, BIT_DEPTH_MIN, MIX_MAX, MIX_MIN, REDUCTION_MAX, REDUCTION_MIN,
};

/// Processor parameters, sampled once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitcrushParams {
    pub bit_depth: f32,
    pub reduction: f32,
    pub mix: f32,
}

impl BitcrushParams {
    /// Quantizer step, hold length in frames and wet amount, with degenerate values
    /// replaced by their bypass-side extremes.
    fn resolve(self) -> (f32, u32, f32) {
        let bit_depth = if self.bit_depth.is_finite() {
            self.bit_depth.clamp(BIT_DEPTH_MIN, BIT_DEPTH_MAX)
        } else {
            BIT_DEPTH_MAX
        };
        let levels = 2.0_f32.powf(bit_depth);
        let step = 2.0 / levels;

        let reduction = if self.reduction.is_finite() {
            self.reduction.trunc().clamp(REDUCTION_MIN, REDUCTION_MAX) as u32
        } else {
            1
        };

        let mix = if self.mix.is_finite() {
            self.mix.clamp(MIX_MIN, MIX_MAX)
        } else {
            MIX_MIN
        };

        (step, reduction, mix)
    }
}

/// Maps `x` onto the grid `-1 + k * step`, rounding toward negative infinity.
///
/// The floor bias is the emulated converter's behavior, not an approximation of
/// round-to-nearest.
#[inline]
pub fn quantize(x: f32, step: f32) -> f32 {
    (((x + 1.0) / step).floor() * step - 1.0).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    /// Position inside the current hold window.
    counter: u32,
    held: f32,
}

pub struct Bitcrusher {
    state: Vec<ChannelState>,
}

impl Bitcrusher {
    pub fn new(channels: usize) -> Self {
        Self {
            state: vec![ChannelState::default(); channels],
        }
    }

    /// Processes `frames` frames of planar audio.
    ///
    /// Output channels without a matching input channel (or beyond the processor's
    /// channel count) are zero-filled. Hold state carries over to the next call.
    pub fn process(
        &mut self,
        input: &[Vec<f32>],
        output: &mut [Vec<f32>],
        frames: usize,
        params: BitcrushParams,
    ) {
        let (step, reduction, mix) = params.resolve();
        let dry = 1.0 - mix;

        for (channel, out) in output.iter_mut().enumerate() {
            let frames = frames.min(out.len());
            let (Some(inp), Some(state)) = (input.get(channel), self.state.get_mut(channel))
            else {
                out[..frames].fill(0.0);
                continue;
            };

            let available = frames.min(inp.len());
            for (y, &x) in out[..available].iter_mut().zip(&inp[..available]) {
                if state.counter == 0 {
                    state.held = quantize(x, step);
                }
                state.counter += 1;
                if state.counter >= reduction {
                    state.counter = 0;
                }

                *y = x * dry + state.held * mix;
            }
            out[available..frames].fill(0.0);
        }
    }
}

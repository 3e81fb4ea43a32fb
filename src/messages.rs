//! Message definitions for communication between the control and render threads.
//!
//! This module defines the enums that serve as the wire format for messages passed through
//! the ring buffers between the control context and the real-time audio thread.

use std::sync::Arc;

use crate::audio_engine::params::Parameter;

/// An immutable decoded sample, interleaved at the output channel count and sample rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub channels: usize,
    pub samples: Arc<[f32]>,
}

impl SampleBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    /// Interleaved values of one frame, or `None` past the end.
    #[cfg(test)]
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get(start..start + self.channels)
    }
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone)]
pub enum AudioMessage {
    /// A trigger found every voice slot busy and was dropped.
    VoiceLimitReached { pad: usize },

    /// A sample buffer the render thread no longer references.
    ///
    /// Handed back so the final drop (and deallocation) happens off the render thread.
    Retired(SampleBuffer),
}

/// Message that is emitted from the control side.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Publish a decoded sample into a pad slot.
    ///
    /// # Parameters
    /// * `pad` - Pad slot (0..NUM_PADS)
    /// * `generation` - Ticket taken when the load was requested; stale tickets are ignored
    /// * `sample` - Pre-decoded immutable sample buffer (shared handle)
    LoadSample {
        pad: usize,
        generation: u64,
        sample: SampleBuffer,
    },

    /// Clear a pad slot. Voices already playing it run to completion.
    UnloadSample { pad: usize, generation: u64 },

    /// Start a new one-shot voice for a pad.
    TriggerPad { pad: usize },

    /// Ramp a parameter linearly from its current value to `target`.
    ///
    /// # Parameters
    /// * `target` - Clamped destination value
    /// * `ramp_frames` - Ramp length in frames, starting at the next block boundary
    SetParameter {
        param: Parameter,
        target: f32,
        ramp_frames: u32,
    },

    /// Stop all currently active voices.
    StopAll(),
}

/// Events emitted from background sample loading.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// Loading started for the given pad.
    Started { pad: usize },

    /// The sample was decoded and handed to the render thread.
    Success { pad: usize, duration_sec: f32 },

    /// Loading failed; the pad keeps its previous binding.
    Error { pad: usize, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_frames() {
        let sample = SampleBuffer {
            channels: 2,
            samples: Arc::from(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6].into_boxed_slice()),
        };

        assert_eq!(sample.frames(), 3);
        assert_eq!(sample.frame(0), Some(&[0.1, 0.2][..]));
        assert_eq!(sample.frame(2), Some(&[0.5, 0.6][..]));
        assert_eq!(sample.frame(3), None);
    }

    #[test]
    fn test_sample_buffer_without_channels() {
        let sample = SampleBuffer {
            channels: 0,
            samples: Arc::from(Vec::<f32>::new().into_boxed_slice()),
        };

        assert_eq!(sample.frames(), 0);
    }
}

//! Voice management for real-time audio mixing.
//!
//! This module provides the [`VoiceSlot`] struct: one recyclable entry of the mixer's
//! voice arena. An active slot is a one-shot read cursor over a pad's sample.
//!
//! Slots are owned by the [`RtMixer`](crate::audio_engine::mixer::RtMixer), which starts
//! them on trigger and releases them once their sample is exhausted.

use crate::messages::SampleBuffer;

/// A single voice in the mixer's arena.
#[derive(Debug, Default)]
pub struct VoiceSlot {
    /// Whether the slot currently plays a sample.
    pub active: bool,

    /// The sample buffer being played.
    sample: Option<SampleBuffer>,

    /// Current playback position in frames.
    pub frame_pos: usize,
}

impl VoiceSlot {
    /// Occupies the slot with a new voice starting at frame 0.
    pub fn start(&mut self, sample: SampleBuffer) {
        self.active = true;
        self.sample = Some(sample);
        self.frame_pos = 0;
    }

    /// Frees the slot, returning the sample handle it held.
    pub fn stop(&mut self) -> Option<SampleBuffer> {
        self.active = false;
        self.frame_pos = 0;
        self.sample.take()
    }

    pub fn is_exhausted(&self) -> bool {
        match &self.sample {
            Some(sample) => self.frame_pos >= sample.frames(),
            None => true,
        }
    }

    /// Adds up to `frames` frames of the sample into planar `out` and advances the cursor.
    ///
    /// Channels the sample does not have are left untouched. Returns the number of frames
    /// written; fewer than `frames` means the voice reached its end.
    pub fn mix_into(&mut self, out: &mut [Vec<f32>], frames: usize) -> usize {
        let Some(sample) = self.sample.as_ref() else {
            return 0;
        };

        let channels = sample.channels;
        let remaining = sample.frames().saturating_sub(self.frame_pos);
        let count = frames.min(remaining);
        if channels == 0 || count == 0 {
            return 0;
        }

        let start = self.frame_pos * channels;
        let source = &sample.samples[start..start + count * channels];
        for (channel, dest) in out.iter_mut().enumerate().take(channels) {
            let len = count.min(dest.len());
            let dest = &mut dest[..len];
            for (d, frame) in dest.iter_mut().zip(source.chunks_exact(channels)) {
                *d += frame[channel];
            }
        }

        self.frame_pos += count;
        count
    }
}

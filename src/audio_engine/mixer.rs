//! Real-time render graph.
//!
//! This module provides the [`RtMixer`] struct which owns everything the render thread
//! touches: the pad sample bank, the voice arena, the [`Bitcrusher`] and the ramped
//! parameters. The fixed signal path per block is
//!
//! ```text
//! voices (source mix) -> bitcrusher -> master gain -> interleaved output
//! ```
//!
//! Every buffer is allocated in [`RtMixer::new`]; nothing on the render path allocates or
//! locks. Sample memory is handed back to the control thread for release; it is freed here
//! only if the event outbox is full, which a capacity from
//! [`RtMixer::with_event_capacity`] covering one render call's worth of messages rules out.

use std::sync::Arc;

use crate::audio_engine::bitcrusher::{BitcrushParams, Bitcrusher};
use crate::audio_engine::constants::{MESSAGE_CAPACITY, NUM_PADS};
use crate::audio_engine::params::{Parameter, ParameterSnapshot};
use crate::audio_engine::ramp::RampedParam;
use crate::audio_engine::voice::VoiceSlot;
use crate::messages::{AudioMessage, SampleBuffer};

/// Queues a sample handle for release on the control thread.
///
/// Handles that are not the last reference are dropped in place; dropping them only
/// decrements a counter.
fn retire_into(events: &mut Vec<AudioMessage>, sample: SampleBuffer) {
    if Arc::strong_count(&sample.samples) > 1 {
        return;
    }

    if events.len() < events.capacity() {
        events.push(AudioMessage::Retired(sample));
    }
    // Outbox full: the buffer is freed here.
}

fn push_event(events: &mut Vec<AudioMessage>, event: AudioMessage) {
    if events.len() < events.capacity() {
        events.push(event);
    }
}

/// Real-time mixer that handles sample slots, voices and the processing chain.
pub struct RtMixer {
    /// Number of output channels.
    channels: usize,

    /// Frames per processing block.
    block_frames: usize,

    /// One sample per pad.
    sample_bank: [Option<SampleBuffer>; NUM_PADS],

    /// Newest load/unload ticket applied per pad.
    bank_generation: [u64; NUM_PADS],

    /// Voice arena; slots are recycled once their sample is exhausted.
    voices: Vec<VoiceSlot>,

    bitcrusher: Bitcrusher,

    bit_depth: RampedParam,
    reduction: RampedParam,
    mix: RampedParam,
    master_gain: RampedParam,

    /// Planar sum of all voices for the current block.
    source: Vec<Vec<f32>>,

    /// Planar bitcrusher output for the current block.
    processed: Vec<Vec<f32>>,

    /// Messages for the control thread, bounded by the pre-allocated capacity.
    events: Vec<AudioMessage>,
}

impl RtMixer {
    /// Creates a mixer with an empty sample bank and no active voices.
    ///
    /// # Parameters
    ///
    /// - `channels`: Number of output channels
    /// - `block_frames`: Frames per processing block (k-rate cadence)
    /// - `max_voices`: Size of the voice arena
    /// - `initial`: Parameter values to start at (no ramp)
    pub fn new(
        channels: usize,
        block_frames: usize,
        max_voices: usize,
        initial: ParameterSnapshot,
    ) -> Self {
        let block_frames = block_frames.max(1);
        let initial = initial.clamped();

        Self {
            channels,
            block_frames,
            sample_bank: std::array::from_fn(|_| None),
            bank_generation: [0; NUM_PADS],
            voices: (0..max_voices).map(|_| VoiceSlot::default()).collect(),
            bitcrusher: Bitcrusher::new(channels),
            bit_depth: RampedParam::new(initial.bit_depth),
            reduction: RampedParam::new(initial.reduction),
            mix: RampedParam::new(initial.mix),
            master_gain: RampedParam::new(initial.master_volume),
            source: vec![vec![0.0; block_frames]; channels],
            processed: vec![vec![0.0; block_frames]; channels],
            events: Vec::with_capacity(MESSAGE_CAPACITY + max_voices + NUM_PADS),
        }
    }

    /// Replaces the event outbox with one holding `capacity` messages.
    ///
    /// Each control message yields at most one event, and every other retirement releases
    /// a buffer held by a pad or a voice, so `message capacity + max voices + pads` never
    /// overflows.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = Vec::with_capacity(capacity);
        self
    }

    /// Binds a sample to a pad, replacing any previous binding.
    ///
    /// Publications carrying an older `generation` than the newest one applied to the pad
    /// are discarded, as are samples whose channel count does not match the mixer.
    pub fn load_sample(&mut self, pad: usize, generation: u64, sample: SampleBuffer) {
        if pad >= NUM_PADS
            || sample.channels != self.channels
            || generation < self.bank_generation[pad]
        {
            retire_into(&mut self.events, sample);
            return;
        }

        self.bank_generation[pad] = generation;
        if let Some(old) = self.sample_bank[pad].replace(sample) {
            retire_into(&mut self.events, old);
        }
    }

    /// Clears a pad binding. Voices already playing it continue to the end.
    pub fn unload_sample(&mut self, pad: usize, generation: u64) {
        if pad >= NUM_PADS || generation < self.bank_generation[pad] {
            return;
        }

        self.bank_generation[pad] = generation;
        if let Some(old) = self.sample_bank[pad].take() {
            retire_into(&mut self.events, old);
        }
    }

    /// Starts a new voice for a pad at frame 0.
    ///
    /// Unbound pads are ignored. When every voice slot is busy the trigger is dropped and
    /// reported; running voices are never cut short.
    pub fn trigger_pad(&mut self, pad: usize) {
        let Some(Some(sample)) = self.sample_bank.get(pad) else {
            return;
        };

        match self.voices.iter_mut().find(|voice| !voice.active) {
            Some(voice) => voice.start(sample.clone()),
            None => push_event(&mut self.events, AudioMessage::VoiceLimitReached { pad }),
        }
    }

    /// Stops all active voices.
    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            if let Some(sample) = voice.stop() {
                retire_into(&mut self.events, sample);
            }
        }
    }

    /// Ramps a parameter from its current value to `target` over `ramp_frames`.
    pub fn set_parameter(&mut self, param: Parameter, target: f32, ramp_frames: u32) {
        let Some(target) = param.clamp(target) else {
            return;
        };
        self.param_mut(param).ramp_to(target, ramp_frames);
    }

    fn param_mut(&mut self, param: Parameter) -> &mut RampedParam {
        match param {
            Parameter::MasterVolume => &mut self.master_gain,
            Parameter::BitDepth => &mut self.bit_depth,
            Parameter::Reduction => &mut self.reduction,
            Parameter::Mix => &mut self.mix,
        }
    }

    fn param(&self, param: Parameter) -> &RampedParam {
        match param {
            Parameter::MasterVolume => &self.master_gain,
            Parameter::BitDepth => &self.bit_depth,
            Parameter::Reduction => &self.reduction,
            Parameter::Mix => &self.mix,
        }
    }

    /// Value the render path currently sees for `param`.
    pub fn parameter_value(&self, param: Parameter) -> f32 {
        self.param(param).value()
    }

    pub fn is_ramping(&self, param: Parameter) -> bool {
        self.param(param).is_ramping()
    }

    /// Renders interleaved audio frames to the output buffer.
    ///
    /// The buffer is processed in blocks of `block_frames`; a trailing partial frame (when
    /// the length is not a multiple of the channel count) is left silent.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        if self.channels == 0 {
            return;
        }

        for chunk in output.chunks_mut(self.block_frames * self.channels) {
            let frames = chunk.len() / self.channels;
            if frames > 0 {
                self.render_block(chunk, frames);
            }
        }
    }

    fn render_block(&mut self, output: &mut [f32], frames: usize) {
        for channel in &mut self.source {
            channel[..frames].fill(0.0);
        }

        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }

            voice.mix_into(&mut self.source, frames);
            if voice.is_exhausted() {
                if let Some(sample) = voice.stop() {
                    retire_into(&mut self.events, sample);
                }
            }
        }

        let span = frames as u32;
        let params = BitcrushParams {
            bit_depth: self.bit_depth.advance(span),
            reduction: self.reduction.advance(span),
            mix: self.mix.advance(span),
        };
        self.bitcrusher
            .process(&self.source, &mut self.processed, frames, params);

        for frame in 0..frames {
            let gain = self.master_gain.next_sample();
            let out_base = frame * self.channels;
            for (channel, processed) in self.processed.iter().enumerate() {
                output[out_base + channel] = processed[frame] * gain;
            }
        }
    }

    /// Takes up to `max` of the oldest pending messages; the rest stay queued.
    pub fn drain_events(&mut self, max: usize) -> std::vec::Drain<'_, AudioMessage> {
        let count = max.min(self.events.len());
        self.events.drain(..count)
    }

    /// Gets the number of channels configured for this mixer.
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.active).count()
    }

    #[cfg(test)]
    pub fn is_loaded(&self, pad: usize) -> bool {
        matches!(self.sample_bank.get(pad), Some(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: ParameterSnapshot = ParameterSnapshot {
        master_volume: 1.0,
        bit_depth: 16.0,
        reduction: 1.0,
        mix: 0.0,
    };

    fn create_test_sample(channels: usize, values: Vec<f32>) -> SampleBuffer {
        SampleBuffer {
            channels,
            samples: Arc::from(values.into_boxed_slice()),
        }
    }

    fn constant_sample(channels: usize, frames: usize, value: f32) -> SampleBuffer {
        create_test_sample(channels, vec![value; channels * frames])
    }

    fn clean_mixer(channels: usize) -> RtMixer {
        RtMixer::new(channels, 128, 4, CLEAN)
    }

    #[test]
    fn test_mixer_creation() {
        let mixer = clean_mixer(2);
        assert_eq!(mixer.channels(), 2);
        assert_eq!(mixer.active_voices(), 0);
        assert!((0..NUM_PADS).all(|pad| !mixer.is_loaded(pad)));
    }

    #[test]
    fn test_render_silence() {
        let mut mixer = clean_mixer(2);
        let mut output = vec![1.0; 512];

        mixer.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_trigger_plays_sample_from_first_frame() {
        let mut mixer = clean_mixer(2);
        mixer.load_sample(0, 1, create_test_sample(2, vec![0.5, -0.25, 0.125, 0.75]));
        mixer.trigger_pad(0);

        let mut output = vec![0.0; 8];
        mixer.render(&mut output);

        assert_eq!(output, vec![0.5, -0.25, 0.125, 0.75, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_trigger_unbound_pad_is_noop() {
        let mut mixer = clean_mixer(1);
        mixer.trigger_pad(0);
        mixer.trigger_pad(NUM_PADS + 3);

        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(mixer.drain_events(usize::MAX).count(), 0);
    }

    #[test]
    fn test_load_sample_wrong_channels() {
        let mut mixer = clean_mixer(2);
        mixer.load_sample(0, 1, constant_sample(1, 10, 0.5));
        assert!(!mixer.is_loaded(0));
    }

    #[test]
    fn test_load_sample_invalid_pad() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(NUM_PADS, 1, constant_sample(1, 10, 0.5));
        assert!((0..NUM_PADS).all(|pad| !mixer.is_loaded(pad)));
    }

    #[test]
    fn test_retrigger_overlaps_instead_of_stealing() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 200, 0.25));

        mixer.trigger_pad(0);
        let mut first = vec![0.0; 100];
        mixer.render(&mut first);

        mixer.trigger_pad(0);
        assert_eq!(mixer.active_voices(), 2);

        let mut second = vec![0.0; 100];
        mixer.render(&mut second);
        assert!(second.iter().all(|&s| s == 0.5));

        // The first voice has ended; the second keeps playing alone.
        assert_eq!(mixer.active_voices(), 1);
        let mut third = vec![0.0; 100];
        mixer.render(&mut third);
        assert!(third.iter().all(|&s| s == 0.25));
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voice_released_after_exhausting_buffer() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 10, 0.5));
        mixer.trigger_pad(0);

        let mut output = vec![0.0; 32];
        mixer.render(&mut output);

        assert_eq!(mixer.active_voices(), 0);
        assert!(output[..10].iter().all(|&s| s == 0.5));
        assert!(output[10..].iter().all(|&s| s == 0.0));
        // The bank still holds the sample, so nothing is handed back.
        assert_eq!(mixer.drain_events(usize::MAX).count(), 0);
    }

    #[test]
    fn test_replaced_sample_is_retired() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 10, 0.1));
        mixer.load_sample(0, 2, constant_sample(1, 10, 0.2));

        let events: Vec<AudioMessage> = mixer.drain_events(usize::MAX).collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AudioMessage::Retired(sample) => assert_eq!(sample.samples[0], 0.1),
            other => panic!("unexpected event {other:?}"),
        }

        mixer.trigger_pad(0);
        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| s == 0.2));
    }

    #[test]
    fn test_partial_drain_keeps_remaining_events_queued() {
        let mut mixer = clean_mixer(1);
        for generation in 1..=4 {
            mixer.load_sample(0, generation, constant_sample(1, 4, generation as f32));
        }

        assert_eq!(mixer.drain_events(2).count(), 2);
        let rest: Vec<AudioMessage> = mixer.drain_events(usize::MAX).collect();
        assert!(matches!(
            rest.as_slice(),
            [AudioMessage::Retired(sample)] if sample.samples[0] == 3.0
        ));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(3, 5, constant_sample(1, 10, 0.5));
        mixer.load_sample(3, 4, constant_sample(1, 10, 0.9));

        mixer.trigger_pad(3);
        let mut output = vec![0.0; 4];
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_sample_replaced_while_playing_is_retired_by_voice() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 50, 0.5));
        mixer.trigger_pad(0);
        mixer.load_sample(0, 2, constant_sample(1, 50, 0.25));

        // Voice still holds the old buffer, so replacement alone retires nothing.
        assert_eq!(mixer.drain_events(usize::MAX).count(), 0);

        let mut output = vec![0.0; 64];
        mixer.render(&mut output);
        assert!(output[..50].iter().all(|&s| s == 0.5));

        let events: Vec<AudioMessage> = mixer.drain_events(usize::MAX).collect();
        assert!(matches!(events.as_slice(), [AudioMessage::Retired(_)]));
    }

    #[test]
    fn test_unload_sample() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 100, 0.5));
        mixer.trigger_pad(0);
        mixer.unload_sample(0, 2);

        assert!(!mixer.is_loaded(0));
        // Voices already playing finish normally.
        assert_eq!(mixer.active_voices(), 1);

        mixer.trigger_pad(0);
        assert_eq!(mixer.active_voices(), 1);

        // A load issued before the unload must not resurrect the binding.
        mixer.load_sample(0, 1, constant_sample(1, 100, 0.5));
        assert!(!mixer.is_loaded(0));
    }

    #[test]
    fn test_stop_all() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 100, 0.5));
        mixer.trigger_pad(0);
        mixer.trigger_pad(0);

        mixer.stop_all();

        assert_eq!(mixer.active_voices(), 0);
        let mut output = vec![0.0; 16];
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_voice_limit() {
        let mut mixer = RtMixer::new(1, 128, 3, CLEAN);
        mixer.load_sample(1, 1, constant_sample(1, 100, 0.1));

        for _ in 0..5 {
            mixer.trigger_pad(1);
        }

        assert_eq!(mixer.active_voices(), 3);
        let dropped = mixer
            .drain_events(usize::MAX)
            .filter(|event| matches!(event, AudioMessage::VoiceLimitReached { pad: 1 }))
            .count();
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_multiple_pads_mix_additively() {
        let mut mixer = clean_mixer(2);
        mixer.load_sample(0, 1, constant_sample(2, 10, 0.25));
        mixer.load_sample(1, 1, constant_sample(2, 10, 0.125));

        mixer.trigger_pad(0);
        mixer.trigger_pad(1);

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.375));
    }

    #[test]
    fn test_master_gain_ramps_without_jumps() {
        let mut mixer = clean_mixer(1);
        mixer.load_sample(0, 1, constant_sample(1, 1_000, 0.5));
        mixer.trigger_pad(0);
        mixer.set_parameter(Parameter::MasterVolume, 0.0, 400);

        let mut output = vec![0.0; 600];
        mixer.render(&mut output);

        assert_eq!(output[0], 0.5);
        for pair in output.windows(2) {
            assert!(pair[1] <= pair[0]);
            assert!(pair[0] - pair[1] < 0.01);
        }
        assert!((output[200] - 0.25).abs() < 1e-3);
        assert!(output[400..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_processor_params_are_block_rate() {
        let mut mixer = clean_mixer(1);
        mixer.set_parameter(Parameter::Mix, 1.0, 256);

        assert_eq!(mixer.parameter_value(Parameter::Mix), 0.0);
        let mut output = vec![0.0; 128];
        mixer.render(&mut output);
        assert!((mixer.parameter_value(Parameter::Mix) - 0.5).abs() < 1e-6);

        let mut output = vec![0.0; 256];
        mixer.render(&mut output);
        assert_eq!(mixer.parameter_value(Parameter::Mix), 1.0);
        assert!(!mixer.is_ramping(Parameter::Mix));
    }

    #[test]
    fn test_set_parameter_clamps() {
        let mut mixer = clean_mixer(1);
        mixer.set_parameter(Parameter::BitDepth, 40.0, 0);
        mixer.set_parameter(Parameter::Reduction, -3.0, 0);

        assert_eq!(mixer.parameter_value(Parameter::BitDepth), 16.0);
        assert_eq!(mixer.parameter_value(Parameter::Reduction), 1.0);
    }

    #[test]
    fn test_crushed_path_matches_bitcrusher() {
        let ramp: Vec<f32> = (0..8).map(|i| -1.0 + 2.0 * i as f32 / 7.0).collect();
        let initial = ParameterSnapshot {
            master_volume: 1.0,
            bit_depth: 1.0,
            reduction: 4.0,
            mix: 1.0,
        };
        let mut mixer = RtMixer::new(1, 128, 4, initial);
        mixer.load_sample(0, 1, create_test_sample(1, ramp));
        mixer.trigger_pad(0);

        let mut output = vec![0.0; 8];
        mixer.render(&mut output);

        assert_eq!(output, vec![-1.0, -1.0, -1.0, -1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_host_buffer_size_does_not_change_output() {
        let values: Vec<f32> = (0..700).map(|i| (i as f32 * 0.05).sin() * 0.8).collect();
        let initial = ParameterSnapshot {
            master_volume: 0.9,
            bit_depth: 6.0,
            reduction: 3.0,
            mix: 0.7,
        };

        let mut whole = RtMixer::new(1, 128, 4, initial);
        whole.load_sample(0, 1, create_test_sample(1, values.clone()));
        whole.trigger_pad(0);
        let mut expected = vec![0.0; 640];
        whole.render(&mut expected);

        let mut split = RtMixer::new(1, 128, 4, initial);
        split.load_sample(0, 1, create_test_sample(1, values));
        split.trigger_pad(0);
        let mut actual = Vec::new();
        for _ in 0..5 {
            let mut chunk = vec![0.0; 128];
            split.render(&mut chunk);
            actual.extend(chunk);
        }

        assert_eq!(actual, expected);
    }
}

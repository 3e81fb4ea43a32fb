//! Audio Stream Module
//!
//! This module handles the render side of the engine:
//! - Stream initialization and configuration (CPAL)
//! - The render context run by the audio callback
//! - Offline rendering driven by the caller
//! - Logger setup

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio_engine::config::EngineConfig;
use crate::audio_engine::constants::NUM_PADS;
use crate::audio_engine::errors::InitializationError;
use crate::audio_engine::mixer::RtMixer;
use crate::audio_engine::params::{Parameter, ParameterSnapshot};
use crate::messages::{AudioMessage, ControlMessage};

/// Handle to a running render context with its message channels.
pub struct AudioStreamHandle {
    /// `None` when the graph is rendered offline.
    stream: Option<Stream>,
    pub producer: Arc<Mutex<Producer<ControlMessage>>>,
    pub consumer: Mutex<Consumer<AudioMessage>>,
    pub output_channels: usize,
    pub output_sample_rate: u32,
    device_lost: Arc<AtomicBool>,
}

impl AudioStreamHandle {
    /// Starts or resumes the device stream.
    pub fn play(&self) -> Result<(), InitializationError> {
        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        self.device_lost.store(false, Ordering::Release);
        Ok(())
    }

    /// Pauses the device stream.
    pub fn pause(&self) -> Result<(), cpal::PauseStreamError> {
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        Ok(())
    }

    /// Whether the stream reported that its device went away.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn is_offline(&self) -> bool {
        self.stream.is_none()
    }
}

/// Everything the render callback owns.
///
/// Drains control messages, renders one host buffer, and hands mixer events back.
pub struct RenderContext {
    consumer: Consumer<ControlMessage>,
    producer: Producer<AudioMessage>,
    mixer: RtMixer,
}

impl RenderContext {
    pub fn process(&mut self, data: &mut [f32]) {
        // Events left over from a previous callback go out first
        self.forward_events();

        // Process incoming messages in real-time
        while let Ok(message) = self.consumer.pop() {
            match message {
                ControlMessage::LoadSample {
                    pad,
                    generation,
                    sample,
                } => {
                    self.mixer.load_sample(pad, generation, sample);
                }
                ControlMessage::UnloadSample { pad, generation } => {
                    self.mixer.unload_sample(pad, generation);
                }
                ControlMessage::TriggerPad { pad } => {
                    self.mixer.trigger_pad(pad);
                }
                ControlMessage::SetParameter {
                    param,
                    target,
                    ramp_frames,
                } => {
                    self.mixer.set_parameter(param, target, ramp_frames);
                }
                ControlMessage::StopAll() => {
                    self.mixer.stop_all();
                }
            }
        }

        // Render audio
        self.mixer.render(data);

        self.forward_events();
    }

    /// Pushes as many pending mixer events as the ring has room for.
    fn forward_events(&mut self) {
        let room = self.producer.slots();
        for event in self.mixer.drain_events(room) {
            let _ = self.producer.push(event);
        }
    }
}

/// Caller-driven render context.
///
/// Runs exactly what the device callback runs, for tests and rendering to memory.
pub struct OfflineRenderer {
    context: RenderContext,
}

impl OfflineRenderer {
    /// Renders interleaved frames into `data`, applying pending control messages first.
    pub fn render(&mut self, data: &mut [f32]) {
        self.context.process(data);
    }

    /// Renders `frames` frames into a new interleaved buffer.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut data = vec![0.0; frames * self.channels()];
        self.render(&mut data);
        data
    }

    pub fn channels(&self) -> usize {
        self.context.mixer.channels()
    }

    pub fn active_voices(&self) -> usize {
        self.context.mixer.active_voices()
    }

    /// Value the render path currently sees for `param`.
    pub fn parameter_value(&self, param: Parameter) -> f32 {
        self.context.mixer.parameter_value(param)
    }

    pub fn is_ramping(&self, param: Parameter) -> bool {
        self.context.mixer.is_ramping(param)
    }
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Default to `info`; override via `RUST_LOG`, e.g. `RUST_LOG=debug` when troubleshooting.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

fn build_render_context(
    config: &EngineConfig,
    channels: usize,
    initial: ParameterSnapshot,
) -> (
    RenderContext,
    Producer<ControlMessage>,
    Consumer<AudioMessage>,
) {
    // Control -> render
    let (producer_in, consumer_in) = RingBuffer::new(config.message_capacity);

    // Render -> control
    let (producer_out, consumer_out) = RingBuffer::new(config.message_capacity);

    let mixer = RtMixer::new(channels, config.block_frames, config.max_voices, initial)
        .with_event_capacity(config.message_capacity + config.max_voices + NUM_PADS);

    let context = RenderContext {
        consumer: consumer_in,
        producer: producer_out,
        mixer,
    };
    (context, producer_in, consumer_out)
}

/// Create and configure the audio stream
///
/// This function:
/// 1. Sets up the default audio device
/// 2. Configures the stream with appropriate parameters
/// 3. Creates ring buffers for message passing
/// 4. Initializes the mixer with `initial` parameter values
/// 5. Builds and returns the (not yet playing) audio stream
pub fn create_audio_stream(
    config: &EngineConfig,
    initial: ParameterSnapshot,
) -> Result<AudioStreamHandle, InitializationError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(InitializationError::NoOutputDevice)?;

    let default_config = device.default_output_config()?;
    let sample_rate = default_config.sample_rate();
    let channels = default_config.channels();

    if channels == 0 || sample_rate == 0 {
        return Err(InitializationError::InvalidOutputFormat {
            channels: channels as usize,
            sample_rate,
        });
    }

    log::info!(
        "Starting AudioEngine... ({} ch@{} Hz)",
        channels,
        sample_rate
    );

    let (mut context, producer_in, consumer_out) =
        build_render_context(config, channels as usize, initial);

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: match config.device_buffer_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        },
    };

    let device_lost = Arc::new(AtomicBool::new(false));
    let error_flag = Arc::clone(&device_lost);

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            context.process(data);
        },
        move |err| {
            log::error!("Audio stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                error_flag.store(true, Ordering::Release);
            }
        },
        None,
    )?;

    Ok(AudioStreamHandle {
        stream: Some(stream),
        producer: Arc::new(Mutex::new(producer_in)),
        consumer: Mutex::new(consumer_out),
        output_channels: channels as usize,
        output_sample_rate: sample_rate,
        device_lost,
    })
}

/// Creates the same graph as [`create_audio_stream`] without a device.
pub fn create_offline_stream(
    config: &EngineConfig,
    initial: ParameterSnapshot,
    channels: usize,
    sample_rate: u32,
) -> Result<(AudioStreamHandle, OfflineRenderer), InitializationError> {
    if channels == 0 || sample_rate == 0 {
        return Err(InitializationError::InvalidOutputFormat {
            channels,
            sample_rate,
        });
    }

    log::info!(
        "Starting offline AudioEngine... ({} ch@{} Hz)",
        channels,
        sample_rate
    );

    let (context, producer_in, consumer_out) = build_render_context(config, channels, initial);

    let handle = AudioStreamHandle {
        stream: None,
        producer: Arc::new(Mutex::new(producer_in)),
        consumer: Mutex::new(consumer_out),
        output_channels: channels,
        output_sample_rate: sample_rate,
        device_lost: Arc::new(AtomicBool::new(false)),
    };
    Ok((handle, OfflineRenderer { context }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use super::*;
    use crate::messages::SampleBuffer;

    const CLEAN: ParameterSnapshot = ParameterSnapshot {
        master_volume: 1.0,
        bit_depth: 16.0,
        reduction: 1.0,
        mix: 0.0,
    };

    #[test]
    fn test_logger_setup() {
        // Multiple calls should be safe (though only the first takes effect)
        setup_logger();
        setup_logger();
    }

    #[test]
    fn test_offline_stream_rejects_empty_format() {
        let result = create_offline_stream(&EngineConfig::default(), CLEAN, 0, 48_000);
        assert!(matches!(
            result,
            Err(InitializationError::InvalidOutputFormat { .. })
        ));
    }

    #[test]
    fn test_offline_render_applies_queued_messages() {
        let (handle, mut renderer) =
            create_offline_stream(&EngineConfig::default(), CLEAN, 1, 48_000).unwrap();
        assert!(handle.is_offline());

        {
            let mut producer = handle.producer.lock().unwrap();
            producer
                .push(ControlMessage::LoadSample {
                    pad: 2,
                    generation: 1,
                    sample: SampleBuffer {
                        channels: 1,
                        samples: StdArc::from(vec![0.25; 4].into_boxed_slice()),
                    },
                })
                .unwrap();
            producer.push(ControlMessage::TriggerPad { pad: 2 }).unwrap();
        }

        let output = renderer.render_frames(8);
        assert_eq!(output, vec![0.25, 0.25, 0.25, 0.25, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(renderer.active_voices(), 0);
    }

    #[test]
    fn test_render_events_reach_control_side() {
        let config = EngineConfig {
            max_voices: 1,
            ..EngineConfig::default()
        };
        let (handle, mut renderer) = create_offline_stream(&config, CLEAN, 1, 48_000).unwrap();

        {
            let mut producer = handle.producer.lock().unwrap();
            producer
                .push(ControlMessage::LoadSample {
                    pad: 0,
                    generation: 1,
                    sample: SampleBuffer {
                        channels: 1,
                        samples: StdArc::from(vec![0.5; 64].into_boxed_slice()),
                    },
                })
                .unwrap();
            producer.push(ControlMessage::TriggerPad { pad: 0 }).unwrap();
            producer.push(ControlMessage::TriggerPad { pad: 0 }).unwrap();
        }
        renderer.render_frames(16);

        let mut consumer = handle.consumer.lock().unwrap();
        assert!(matches!(
            consumer.pop(),
            Ok(AudioMessage::VoiceLimitReached { pad: 0 })
        ));
    }

    #[test]
    fn test_retired_samples_wait_for_room_in_full_ring() {
        let config = EngineConfig {
            message_capacity: 2,
            ..EngineConfig::default()
        };
        let (handle, mut renderer) = create_offline_stream(&config, CLEAN, 1, 48_000).unwrap();
        let load = |generation: u64| ControlMessage::LoadSample {
            pad: 0,
            generation,
            sample: SampleBuffer {
                channels: 1,
                samples: StdArc::from(vec![generation as f32; 4].into_boxed_slice()),
            },
        };

        let mut retired = Vec::new();
        let collect = |retired: &mut Vec<f32>| {
            let mut consumer = handle.consumer.lock().unwrap();
            while let Ok(message) = consumer.pop() {
                if let AudioMessage::Retired(sample) = message {
                    retired.push(sample.samples[0]);
                }
            }
        };

        for generation in [1, 2] {
            handle.producer.lock().unwrap().push(load(generation)).unwrap();
        }
        renderer.render_frames(16);

        for generation in [3, 4] {
            handle.producer.lock().unwrap().push(load(generation)).unwrap();
        }
        // Three retirements against a ring of two: one has to wait.
        renderer.render_frames(16);
        collect(&mut retired);
        assert_eq!(retired, vec![1.0, 2.0]);

        renderer.render_frames(16);
        collect(&mut retired);
        assert_eq!(retired, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_audio_stream_creation() {
        // Actual stream creation requires audio hardware
        if cpal::default_host().default_output_device().is_none() {
            return; // Skip test if no audio device available
        }

        // Expected to fail in many test environments; only the signature matters here.
        let _ = create_audio_stream(&EngineConfig::default(), CLEAN);
    }
}

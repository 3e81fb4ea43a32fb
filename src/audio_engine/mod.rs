//! Audio Engine Module
//!
//! This module provides the sampler's real-time playback and lo-fi processing.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL audio stream management, render callback and offline rendering
//! - [`bitcrusher`]: Bit-depth and sample-rate reduction processor
//! - [`channels`]: Channel layout conversion
//! - [`config`]: Engine construction settings
//! - [`constants`]: Configuration constants and limits
//! - [`errors`]: Audio-specific error types
//! - [`mixer`]: Real-time mixing engine
//! - [`params`]: Parameter names, ranges and snapshots
//! - [`ramp`]: Linear parameter ramps
//! - [`sample_loader`]: Audio decoding and resampling
//! - [`subscription`]: Parameter-change listeners
//! - [`voice`]: Voice management and lifecycle
//!
//! The main [`AudioEngine`] struct orchestrates these components to provide
//! the control surface used by the presentation layer.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use rtrb::Producer;

use crate::audio_engine::audio_stream::{
    AudioStreamHandle, create_audio_stream, create_offline_stream, setup_logger,
};
use crate::audio_engine::sample_loader::decode_audio_bytes;
use crate::audio_engine::subscription::Subscribers;
use crate::messages::{AudioMessage, ControlMessage, LoaderEvent, SampleBuffer};

pub(crate) mod audio_stream;
pub mod bitcrusher;
pub(crate) mod channels;
pub mod config;
pub(crate) mod constants;
pub mod errors;
pub(crate) mod mixer;
pub mod params;
pub(crate) mod ramp;
pub(crate) mod sample_loader;
pub(crate) mod subscription;
pub(crate) mod voice;

pub use audio_stream::OfflineRenderer;
pub use config::EngineConfig;
pub use constants::NUM_PADS;
pub use errors::{DecodeError, InitializationError, LoadError, UnknownParameter};
pub use params::{Parameter, ParameterSnapshot};
pub use subscription::Subscription;

/// Where the engine is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No render context exists.
    Uninitialized,
    /// The render context is being built.
    Initializing,
    /// Rendering; triggers and loads take effect.
    Ready,
    /// The render context exists but the host is not pulling audio.
    Suspended,
}

/// Background sample load started by [`AudioEngine::load_sample_async`].
pub struct LoadHandle {
    pad: usize,
    join: JoinHandle<Result<(), LoadError>>,
}

impl LoadHandle {
    pub fn pad(&self) -> usize {
        self.pad
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the sample is published to the render thread or loading failed.
    pub fn wait(self) -> Result<(), LoadError> {
        self.join.join().map_err(|_| LoadError::LoaderPanicked)?
    }
}

/// Nominal parameter values and which of them the render thread has yet to receive.
struct NominalParams {
    snapshot: ParameterSnapshot,
    unsent: [bool; Parameter::ALL.len()],
}

/// Drum sampler engine: eight pads mixed through a bitcrusher into the output device.
pub struct AudioEngine {
    config: EngineConfig,
    lifecycle: LifecycleState,
    stream_handle: Option<AudioStreamHandle>,
    params: Mutex<NominalParams>,
    subscribers: Subscribers,
    generations: Arc<[AtomicU64; NUM_PADS]>,
    loader_tx: Sender<LoaderEvent>,
    loader_rx: Mutex<Receiver<LoaderEvent>>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AudioEngine {
    /// Create a new, uninitialized AudioEngine.
    pub fn new(config: EngineConfig) -> Self {
        let (loader_tx, loader_rx) = std::sync::mpsc::channel();
        let params = config.initial.clamped();

        AudioEngine {
            config,
            lifecycle: LifecycleState::Uninitialized,
            stream_handle: None,
            params: Mutex::new(NominalParams {
                snapshot: params,
                unsent: [false; Parameter::ALL.len()],
            }),
            subscribers: Subscribers::default(),
            generations: Arc::new(std::array::from_fn(|_| AtomicU64::new(0))),
            loader_tx,
            loader_rx: Mutex::new(loader_rx),
        }
    }

    /// Build the render graph on the default output device and start it.
    ///
    /// A no-op when already running; resumes the existing stream when suspended.
    pub fn initialize(&mut self) -> Result<(), InitializationError> {
        match self.lifecycle() {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Suspended => return self.resume(),
            LifecycleState::Uninitialized | LifecycleState::Initializing => {}
        }

        setup_logger();
        self.lifecycle = LifecycleState::Initializing;

        let result = create_audio_stream(&self.config, self.state()).and_then(|handle| {
            handle.play()?;
            Ok(handle)
        });

        match result {
            Ok(handle) => {
                log::info!("Audio engine ready");
                self.mark_parameters_sent();
                self.stream_handle = Some(handle);
                self.lifecycle = LifecycleState::Ready;
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to initialize audio engine: {err}");
                self.lifecycle = LifecycleState::Uninitialized;
                Err(err)
            }
        }
    }

    /// Build the render graph without a device.
    ///
    /// The returned renderer runs exactly what the device callback would; the caller
    /// drives it by calling [`OfflineRenderer::render`].
    pub fn initialize_offline(
        &mut self,
        channels: usize,
        sample_rate: u32,
    ) -> Result<OfflineRenderer, InitializationError> {
        if self.stream_handle.is_some() {
            return Err(InitializationError::AlreadyInitialized);
        }

        setup_logger();
        self.lifecycle = LifecycleState::Initializing;

        match create_offline_stream(&self.config, self.state(), channels, sample_rate) {
            Ok((handle, renderer)) => {
                self.mark_parameters_sent();
                self.stream_handle = Some(handle);
                self.lifecycle = LifecycleState::Ready;
                Ok(renderer)
            }
            Err(err) => {
                log::error!("Failed to initialize offline audio engine: {err}");
                self.lifecycle = LifecycleState::Uninitialized;
                Err(err)
            }
        }
    }

    fn resume(&mut self) -> Result<(), InitializationError> {
        if let Some(handle) = &self.stream_handle {
            handle.play()?;
        }
        self.lifecycle = LifecycleState::Ready;
        log::info!("Audio engine resumed");
        Ok(())
    }

    /// Pause rendering, keeping every pad binding. [`initialize`](Self::initialize) resumes.
    pub fn suspend(&mut self) -> Result<(), cpal::PauseStreamError> {
        if self.lifecycle() != LifecycleState::Ready {
            return Ok(());
        }

        if let Some(handle) = &self.stream_handle {
            handle.pause()?;
        }
        self.lifecycle = LifecycleState::Suspended;
        log::info!("Audio engine suspended");
        Ok(())
    }

    /// Drop the render context and every bound sample.
    ///
    /// An [`OfflineRenderer`] keeps its own graph alive until it is dropped.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.stream_handle.take() {
            drop(handle);
            log::info!("Audio engine torn down");
        }
        self.lifecycle = LifecycleState::Uninitialized;
    }

    /// Current lifecycle state. A lost output device reports as suspended.
    pub fn lifecycle(&self) -> LifecycleState {
        let device_lost = self
            .stream_handle
            .as_ref()
            .is_some_and(AudioStreamHandle::is_device_lost);

        if self.lifecycle == LifecycleState::Ready && device_lost {
            LifecycleState::Suspended
        } else {
            self.lifecycle
        }
    }

    /// Decode `bytes` and bind the result to `pad`, replacing any previous binding.
    ///
    /// On error the pad keeps whatever it was bound to.
    pub fn load_sample(&self, pad: usize, bytes: &[u8]) -> Result<(), LoadError> {
        self.load_bytes(pad, bytes.to_vec(), None)
    }

    /// Read an audio file and bind it to `pad`. The extension is used as a format hint.
    pub fn load_sample_file(&self, pad: usize, path: impl AsRef<Path>) -> Result<(), LoadError> {
        self.ready_handle().ok_or(LoadError::NotReady)?;
        check_pad(pad)?;

        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let hint = path.extension().and_then(|ext| ext.to_str());
        self.load_bytes(pad, bytes, hint)
    }

    fn load_bytes(&self, pad: usize, bytes: Vec<u8>, hint: Option<&str>) -> Result<(), LoadError> {
        self.collect_render_events();

        let handle = self.ready_handle().ok_or(LoadError::NotReady)?;
        check_pad(pad)?;
        let generation = self.next_generation(pad);

        let sample = decode_audio_bytes(
            bytes,
            hint,
            handle.output_channels,
            handle.output_sample_rate,
        )?;
        let frames = sample.frames();
        publish_sample(&handle.producer, pad, generation, sample)?;

        log::debug!("Loaded {frames} frames into pad {pad}");
        Ok(())
    }

    /// Decode `bytes` on a background thread and bind the result to `pad`.
    ///
    /// Progress is reported through [`poll_loader_events`](Self::poll_loader_events). When
    /// several loads target the same pad, the most recently requested one wins regardless
    /// of which finishes decoding first.
    pub fn load_sample_async(&self, pad: usize, bytes: Vec<u8>) -> Result<LoadHandle, LoadError> {
        self.collect_render_events();

        let handle = self.ready_handle().ok_or(LoadError::NotReady)?;
        check_pad(pad)?;
        let generation = self.next_generation(pad);

        let loader_tx = self.loader_tx.clone();
        let producer = Arc::clone(&handle.producer);
        let output_channels = handle.output_channels;
        let output_sample_rate = handle.output_sample_rate;

        let join = thread::spawn(move || {
            let _ = loader_tx.send(LoaderEvent::Started { pad });

            let result = decode_audio_bytes(bytes, None, output_channels, output_sample_rate)
                .map_err(LoadError::from)
                .and_then(|sample| {
                    let duration_sec = sample.frames() as f32 / output_sample_rate as f32;
                    publish_sample(&producer, pad, generation, sample)?;
                    Ok(duration_sec)
                });

            match result {
                Ok(duration_sec) => {
                    let _ = loader_tx.send(LoaderEvent::Success { pad, duration_sec });
                    Ok(())
                }
                Err(err) => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        pad,
                        error: err.to_string(),
                    });
                    Err(err)
                }
            }
        });

        Ok(LoadHandle { pad, join })
    }

    /// Poll for pending background loader events.
    ///
    /// Returns `None` when no events are available.
    pub fn poll_loader_events(&self) -> Option<LoaderEvent> {
        let loader_rx = self.loader_rx.lock().unwrap_or_else(PoisonError::into_inner);
        loader_rx.try_recv().ok()
    }

    /// Clear a pad binding. Voices already playing it run to completion.
    pub fn unload_sample(&self, pad: usize) -> Result<(), LoadError> {
        self.collect_render_events();

        let handle = self.ready_handle().ok_or(LoadError::NotReady)?;
        check_pad(pad)?;
        let generation = self.next_generation(pad);

        if !send(handle, ControlMessage::UnloadSample { pad, generation }) {
            return Err(LoadError::QueueFull);
        }
        Ok(())
    }

    /// Start a one-shot voice for `pad`.
    ///
    /// Silently ignored when the pad is unbound or out of range, or the engine is not ready.
    pub fn trigger_pad(&self, pad: usize) {
        self.collect_render_events();

        let Some(handle) = self.ready_handle() else {
            log::debug!("Ignoring trigger for pad {pad}: engine not ready");
            return;
        };
        if pad >= NUM_PADS {
            log::debug!("Ignoring trigger for pad {pad}: out of range");
            return;
        }

        if !send(handle, ControlMessage::TriggerPad { pad }) {
            log::warn!("Dropped trigger for pad {pad}: control queue is full");
        }
    }

    /// Stop playback of all active voices.
    pub fn stop_all(&self) {
        self.collect_render_events();

        if let Some(handle) = &self.stream_handle {
            if !send(handle, ControlMessage::StopAll()) {
                log::warn!("Dropped stop: control queue is full");
            }
        }
    }

    /// Set a parameter, ramping to the clamped value over the smoothing window.
    ///
    /// Non-finite values are ignored. Subscribers are notified after every call.
    pub fn set_parameter(&self, param: Parameter, value: f32) {
        self.collect_render_events();

        let Some(value) = param.clamp(value) else {
            log::warn!("Ignoring non-finite value for {param}");
            return;
        };

        let snapshot = {
            let mut nominal = self.params.lock().unwrap_or_else(PoisonError::into_inner);
            if nominal.snapshot.get(param) != value {
                nominal.snapshot.set(param, value);
                nominal.unsent[param as usize] = true;
                log::debug!("{param} -> {value}");
            }

            if let Some(handle) = &self.stream_handle {
                self.send_unsent(&mut nominal, handle);
            }
            nominal.snapshot
        };

        self.subscribers.notify(&snapshot);
    }

    /// Sends every parameter change the render thread has not received yet.
    ///
    /// Whatever does not fit in the control queue stays marked and goes out on a later call.
    fn send_unsent(&self, nominal: &mut NominalParams, handle: &AudioStreamHandle) {
        let ramp_frames = self.config.ramp_frames(handle.output_sample_rate);

        for param in Parameter::ALL {
            if !nominal.unsent[param as usize] {
                continue;
            }

            let message = ControlMessage::SetParameter {
                param,
                target: nominal.snapshot.get(param),
                ramp_frames,
            };
            if !send(handle, message) {
                log::warn!("Deferred {param} change: control queue is full");
                return;
            }
            nominal.unsent[param as usize] = false;
        }
    }

    /// A freshly built graph starts from the nominal values, so nothing is outstanding.
    fn mark_parameters_sent(&self) {
        let mut nominal = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        nominal.unsent = [false; Parameter::ALL.len()];
    }

    /// [`set_parameter`](Self::set_parameter) addressed by external name.
    pub fn set_parameter_by_name(&self, name: &str, value: f32) -> Result<(), UnknownParameter> {
        let param: Parameter = name.parse()?;
        self.set_parameter(param, value);
        Ok(())
    }

    /// Nominal (target) value of every parameter.
    pub fn state(&self) -> ParameterSnapshot {
        self.params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
    }

    /// Register `callback` to receive the full snapshot after every parameter change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ParameterSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    fn ready_handle(&self) -> Option<&AudioStreamHandle> {
        match self.lifecycle() {
            LifecycleState::Ready => self.stream_handle.as_ref(),
            _ => None,
        }
    }

    fn next_generation(&self, pad: usize) -> u64 {
        self.generations[pad].fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Handles messages from the render thread, dropping retired samples here.
    fn collect_render_events(&self) {
        let Some(handle) = &self.stream_handle else {
            return;
        };

        let mut consumer = handle.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        while let Ok(message) = consumer.pop() {
            match message {
                AudioMessage::VoiceLimitReached { pad } => {
                    log::warn!("Voice limit reached, dropped trigger for pad {pad}");
                }
                AudioMessage::Retired(sample) => {
                    log::trace!("Releasing sample of {} frames", sample.frames());
                    drop(sample);
                }
            }
        }
    }
}

fn check_pad(pad: usize) -> Result<(), LoadError> {
    if pad >= NUM_PADS {
        return Err(LoadError::PadOutOfRange { pad, max: NUM_PADS });
    }
    Ok(())
}

fn send(handle: &AudioStreamHandle, message: ControlMessage) -> bool {
    let mut producer = handle
        .producer
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    producer.push(message).is_ok()
}

fn publish_sample(
    producer: &Mutex<Producer<ControlMessage>>,
    pad: usize,
    generation: u64,
    sample: SampleBuffer,
) -> Result<(), LoadError> {
    let mut producer = producer.lock().unwrap_or_else(PoisonError::into_inner);
    producer
        .push(ControlMessage::LoadSample {
            pad,
            generation,
            sample,
        })
        .map_err(|_| LoadError::QueueFull)
}

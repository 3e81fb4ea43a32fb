//! Audio-specific error types.

use thiserror::Error;

/// Errors that can occur while bringing up the render context.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// The host has no output device.
    #[error("no audio output device found")]
    NoOutputDevice,

    /// The device did not report a usable default configuration.
    #[error("no default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// The output stream could not be built.
    #[error("failed to create audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The output stream could not be started or resumed.
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// Zero channels or a zero sample rate.
    #[error("invalid output format: {channels} ch @ {sample_rate} Hz")]
    InvalidOutputFormat {
        /// Requested channel count.
        channels: usize,
        /// Requested sample rate in Hz.
        sample_rate: u32,
    },

    /// An offline graph was requested while a render context already exists.
    #[error("audio engine already initialized")]
    AlreadyInitialized,
}

/// Errors that can occur while decoding audio data into a sample.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container or codec rejected the data.
    #[error("failed to decode audio data: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Audio data has no default track.
    #[error("audio data has no default track")]
    NoDefaultTrack,

    /// Audio data is missing sample rate information.
    #[error("audio data is missing a sample rate")]
    MissingSampleRate,

    /// Audio data is missing channel information.
    #[error("audio data is missing channel information")]
    MissingChannels,

    /// The stream decoded to zero frames.
    #[error("audio data contains no frames")]
    Empty,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: source has {file_channels} channels, output has {output_channels} channels"
    )]
    UnsupportedChannels {
        /// Number of channels in the source data.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },
}

/// Errors returned by the sample loading entry points.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Failed to read the audio file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Loading only has effect while the engine is running.
    #[error("audio engine not ready")]
    NotReady,

    #[error("pad out of range (expected 0..{max}, got {pad})")]
    PadOutOfRange { pad: usize, max: usize },

    /// The control ring was full; the render thread is not draining it.
    #[error("failed to publish sample - message queue is full")]
    QueueFull,

    #[error("sample loader thread panicked")]
    LoaderPanicked,
}

/// A parameter name outside `masterVolume`, `bitDepth`, `reduction`, `mix`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown parameter: {0}")]
pub struct UnknownParameter(pub String);

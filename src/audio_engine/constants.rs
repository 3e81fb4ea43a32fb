//! Audio engine configuration constants and limits.

/// Number of pad slots on the panel.
pub const NUM_PADS: usize = 8;

/// Maximum number of voices that can be active simultaneously.
pub const MAX_VOICES: usize = 32;

/// Frames per render block (k-rate parameter cadence).
pub const BLOCK_FRAMES: usize = 128;

/// Capacity of each control/render message ring.
pub const MESSAGE_CAPACITY: usize = 1024;

/// Fixed buffer size requested from the output device.
pub const DEVICE_BUFFER_FRAMES: u32 = 512;

/// Length of the linear ramp applied to every parameter change.
pub const SMOOTHING_WINDOW_MS: f32 = 20.0;

/// Minimum volume level (silence).
pub const VOLUME_MIN: f32 = 0.0;

/// Maximum volume level (100%).
pub const VOLUME_MAX: f32 = 1.0;

/// Lowest bit depth; two quantization levels.
pub const BIT_DEPTH_MIN: f32 = 1.0;

/// Highest bit depth.
pub const BIT_DEPTH_MAX: f32 = 16.0;

/// No sample-rate reduction.
pub const REDUCTION_MIN: f32 = 1.0;

/// Longest hold window in frames.
pub const REDUCTION_MAX: f32 = 32.0;

/// Fully dry.
pub const MIX_MIN: f32 = 0.0;

/// Fully crushed.
pub const MIX_MAX: f32 = 1.0;

pub const DEFAULT_MASTER_VOLUME: f32 = 0.8;

/// The emulated hardware is a 12-bit sampler.
pub const DEFAULT_BIT_DEPTH: f32 = 12.0;

pub const DEFAULT_REDUCTION: f32 = 1.0;

pub const DEFAULT_MIX: f32 = 1.0;

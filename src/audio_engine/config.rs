use crate::audio_engine::constants::{
    BLOCK_FRAMES, DEVICE_BUFFER_FRAMES, MAX_VOICES, MESSAGE_CAPACITY, SMOOTHING_WINDOW_MS,
};
use crate::audio_engine::params::ParameterSnapshot;

/// Construction-time settings for an [`AudioEngine`](crate::audio_engine::AudioEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frames per render block; processor parameters are sampled once per block.
    pub block_frames: usize,

    /// Length of the linear ramp applied to every parameter change.
    pub smoothing_ms: f32,

    /// Size of the voice arena. Triggers beyond it are dropped.
    pub max_voices: usize,

    /// Capacity of each control/render message ring.
    pub message_capacity: usize,

    /// Fixed device buffer size, or `None` for the host default.
    pub device_buffer_frames: Option<u32>,

    /// Parameter values the graph starts with.
    pub initial: ParameterSnapshot,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_frames: BLOCK_FRAMES,
            smoothing_ms: SMOOTHING_WINDOW_MS,
            max_voices: MAX_VOICES,
            message_capacity: MESSAGE_CAPACITY,
            device_buffer_frames: Some(DEVICE_BUFFER_FRAMES),
            initial: ParameterSnapshot::default(),
        }
    }
}

impl EngineConfig {
    /// Number of frames a parameter ramp spans at `sample_rate`.
    pub fn ramp_frames(&self, sample_rate: u32) -> u32 {
        if !self.smoothing_ms.is_finite() || self.smoothing_ms <= 0.0 {
            return 0;
        }
        (self.smoothing_ms / 1000.0 * sample_rate as f32).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ramp_is_twenty_ms() {
        let config = EngineConfig::default();
        assert_eq!(config.ramp_frames(44_100), 882);
        assert_eq!(config.ramp_frames(48_000), 960);
    }

    #[test]
    fn test_disabled_smoothing() {
        let config = EngineConfig {
            smoothing_ms: 0.0,
            ..EngineConfig::default()
        };
        assert_eq!(config.ramp_frames(48_000), 0);
    }
}

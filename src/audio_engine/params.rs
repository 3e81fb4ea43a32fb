//! Parameter identities, ranges and nominal state snapshots.

use std::fmt;
use std::str::FromStr;

use crate::audio_engine::constants::{
    BIT_DEPTH_MAX, BIT_DEPTH_MIN, DEFAULT_BIT_DEPTH, DEFAULT_MASTER_VOLUME, DEFAULT_MIX,
    DEFAULT_REDUCTION, MIX_MAX, MIX_MIN, REDUCTION_MAX, REDUCTION_MIN, VOLUME_MAX, VOLUME_MIN,
};
use crate::audio_engine::errors::UnknownParameter;

/// A control exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Output gain after the processor.
    MasterVolume,
    /// Quantizer resolution in bits.
    BitDepth,
    /// Sample-and-hold length in frames.
    Reduction,
    /// Wet/dry balance of the crushed signal.
    Mix,
}

impl Parameter {
    pub const ALL: [Parameter; 4] = [
        Parameter::MasterVolume,
        Parameter::BitDepth,
        Parameter::Reduction,
        Parameter::Mix,
    ];

    /// External name used by the control surface.
    pub fn name(self) -> &'static str {
        match self {
            Self::MasterVolume => "masterVolume",
            Self::BitDepth => "bitDepth",
            Self::Reduction => "reduction",
            Self::Mix => "mix",
        }
    }

    /// Inclusive valid range.
    pub fn range(self) -> (f32, f32) {
        match self {
            Self::MasterVolume => (VOLUME_MIN, VOLUME_MAX),
            Self::BitDepth => (BIT_DEPTH_MIN, BIT_DEPTH_MAX),
            Self::Reduction => (REDUCTION_MIN, REDUCTION_MAX),
            Self::Mix => (MIX_MIN, MIX_MAX),
        }
    }

    /// Clamps `value` into range. Reduction is an integer frame count.
    ///
    /// Returns `None` for non-finite input.
    pub fn clamp(self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }

        let (min, max) = self.range();
        let value = match self {
            Self::Reduction => value.trunc(),
            _ => value,
        };
        Some(value.clamp(min, max))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .into_iter()
            .find(|param| param.name() == s)
            .ok_or_else(|| UnknownParameter(s.to_string()))
    }
}

/// Nominal (target) values of every parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub master_volume: f32,
    pub bit_depth: f32,
    pub reduction: f32,
    pub mix: f32,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            master_volume: DEFAULT_MASTER_VOLUME,
            bit_depth: DEFAULT_BIT_DEPTH,
            reduction: DEFAULT_REDUCTION,
            mix: DEFAULT_MIX,
        }
    }
}

impl ParameterSnapshot {
    pub fn get(&self, param: Parameter) -> f32 {
        match param {
            Parameter::MasterVolume => self.master_volume,
            Parameter::BitDepth => self.bit_depth,
            Parameter::Reduction => self.reduction,
            Parameter::Mix => self.mix,
        }
    }

    pub fn set(&mut self, param: Parameter, value: f32) {
        match param {
            Parameter::MasterVolume => self.master_volume = value,
            Parameter::BitDepth => self.bit_depth = value,
            Parameter::Reduction => self.reduction = value,
            Parameter::Mix => self.mix = value,
        }
    }

    /// Same snapshot with every field clamped into range; non-finite fields take defaults.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let mut out = defaults;
        for param in Parameter::ALL {
            let value = param.clamp(self.get(param)).unwrap_or(defaults.get(param));
            out.set(param, value);
        }
        out
    }
}

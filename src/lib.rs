//! Lo-fi drum sampler audio engine.
//!
//! Eight pads of decoded samples are mixed, run through a 12-bit style bitcrusher and
//! sent to the default output device. All control happens through [`AudioEngine`]; the
//! render thread only ever sees messages on lock-free rings.

pub mod audio_engine;
pub mod messages;

pub use audio_engine::{
    AudioEngine, DecodeError, EngineConfig, InitializationError, LifecycleState, LoadError,
    LoadHandle, NUM_PADS, OfflineRenderer, Parameter, ParameterSnapshot, Subscription,
    UnknownParameter,
};
pub use messages::LoaderEvent;

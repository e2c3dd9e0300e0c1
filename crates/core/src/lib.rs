//! Core library for the Sensory Anchor application.
//!
//! The crate implements the session audio-haptic engine: an
//! amplitude-modulated sine tone with click-free attack and release, a haptic
//! pulse train locked to the same rate, and the countdown-driven session state
//! machine that owns both. Each module owns one piece (render graph, tone
//! synthesis, envelope, haptics, coarse timers, output acquisition) and
//! [`SessionController`] ties them together.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod envelope;
pub mod error;
pub mod haptics;
pub mod output;
pub mod session;
pub mod synth;
pub mod timeline;

pub use analysis::{SignalProbe, SignalSummary};
pub use audio::{AudioGraph, AudioGraphHandle, AudioParam, Oscillator, VoiceId, VoiceSpec};
pub use config::{
    AudioConfig, EngineConfig, EnvelopeConfig, HapticConfig, SessionConfig, ToneConfig,
};
pub use envelope::EnvelopeController;
pub use error::{AnchorError, Result};
pub use haptics::{
    HapticActuator, HapticCommand, HapticPattern, HapticScheduler, NoHaptics, RecordingActuator,
    TracingActuator,
};
#[cfg(feature = "cpal")]
pub use output::DeviceOutput;
pub use output::{AudioOutput, OfflineOutput, OutputStream};
pub use session::{
    EngineState, SessionController, SessionEvent, SessionId, SessionParameters, StartOutcome,
    StopReason,
};
pub use synth::ToneSynthesizer;
pub use timeline::{CoarseTimers, FiredTimer, TimerId, TimerKind};

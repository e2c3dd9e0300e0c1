use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{AnchorError, Result};

/// Top-level configuration structure for the engine.
///
/// Every field has a default so a JSON file only needs to name the constants
/// it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub tone: ToneConfig,
    pub envelope: EnvelopeConfig,
    pub haptics: HapticConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Rejects constant combinations that cannot produce a click-free,
    /// never-silent session.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate must be positive"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels must be positive"));
        }
        if !(self.tone.baseline_gain > 0.0) {
            return Err(invalid("tone.baseline_gain must be positive"));
        }
        if !(self.tone.modulation_depth >= 0.0 && self.tone.modulation_depth < self.tone.baseline_gain)
        {
            return Err(invalid(
                "tone.modulation_depth must be non-negative and below tone.baseline_gain",
            ));
        }
        if !(self.envelope.ceiling > 0.0 && self.envelope.ceiling <= 1.0) {
            return Err(invalid("envelope.ceiling must be in (0, 1]"));
        }
        for (name, seconds) in [
            ("envelope.attack_seconds", self.envelope.attack_seconds),
            ("envelope.release_seconds", self.envelope.release_seconds),
            ("envelope.restart_fade_seconds", self.envelope.restart_fade_seconds),
        ] {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if !(self.haptics.duty_cycle > 0.0 && self.haptics.duty_cycle < 1.0) {
            return Err(invalid("haptics.duty_cycle must be in (0, 1)"));
        }
        if self.session.tick_interval_ms == 0 {
            return Err(invalid("session.tick_interval_ms must be positive"));
        }
        if self.session.post_stop_delay().as_secs_f64() < self.envelope.release_seconds {
            return Err(invalid(
                "session.post_stop_delay_ms must cover envelope.release_seconds",
            ));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AnchorError {
    AnchorError::InvalidConfig(message.into())
}

/// Format used when the engine renders on its own clock (offline output and
/// the `probe` command). A hardware output always runs at the device's
/// default sample rate and channel count and ignores these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Amplitude-modulation gains. The pulse gain swings between
/// `baseline_gain - modulation_depth` and `baseline_gain + modulation_depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub baseline_gain: f32,
    pub modulation_depth: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            baseline_gain: 0.7,
            modulation_depth: 0.3,
        }
    }
}

/// Master gain ramps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub ceiling: f32,
    pub attack_seconds: f64,
    pub release_seconds: f64,
    /// Fade applied to a superseded voice when a session is restarted.
    pub restart_fade_seconds: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            ceiling: 0.8,
            attack_seconds: 1.5,
            release_seconds: 1.0,
            restart_fade_seconds: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticConfig {
    /// Fraction of each pulse cycle the actuator is driven on.
    pub duty_cycle: f32,
}

impl Default for HapticConfig {
    fn default() -> Self {
        Self { duty_cycle: 0.4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    /// Delay between `stop` and the `Ended` notification. Should cover the
    /// release ramp.
    pub post_stop_delay_ms: u64,
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn post_stop_delay(&self) -> Duration {
        Duration::from_millis(self.post_stop_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            post_stop_delay_ms: 1000,
        }
    }
}

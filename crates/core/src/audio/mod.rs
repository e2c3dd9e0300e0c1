//! Render path: oscillators and gain automation evaluated per sample against
//! the graph's own frame clock.

use std::{
    f32::consts::TAU,
    f64::consts::TAU as TAU_F64,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{AnchorError, Result};

mod param;

pub use param::AudioParam;

/// Pure sine oscillator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f32,
    phase: f32,
    phase_increment: f32,
}

impl Oscillator {
    pub fn new(frequency: f32, sample_rate: u32) -> Self {
        // Whole cycles per sample alias away; keep only the fractional turn.
        let cycles_per_sample = (f64::from(frequency) / f64::from(sample_rate)).fract();
        Self {
            frequency,
            phase: 0.0,
            phase_increment: (TAU_F64 * cycles_per_sample) as f32,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Generate the next sample in [-1, 1].
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.phase.sin();
        self.phase = (self.phase + self.phase_increment).rem_euclid(TAU);
        sample
    }
}

/// Identifies a carrier/modulator pair inside an [`AudioGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

/// Settings for a new amplitude-modulated voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSpec {
    pub carrier_hz: f32,
    pub modulation_hz: f32,
    pub baseline_gain: f32,
    pub modulation_depth: f32,
}

/// Carrier sine whose amplitude is driven by a low-frequency sine around a
/// fixed baseline.
#[derive(Debug)]
struct Voice {
    id: VoiceId,
    carrier: Oscillator,
    modulator: Oscillator,
    baseline_gain: f32,
    modulation_depth: f32,
    start_frame: u64,
    stop_frame: Option<u64>,
}

impl Voice {
    fn sounds_at(&self, frame: u64) -> bool {
        frame >= self.start_frame && self.stop_frame.map_or(true, |stop| frame < stop)
    }

    fn finished_at(&self, frame: u64) -> bool {
        self.stop_frame.is_some_and(|stop| frame >= stop)
    }

    fn next_sample(&mut self) -> f32 {
        let pulse_gain = self.baseline_gain + self.modulation_depth * self.modulator.next_sample();
        self.carrier.next_sample() * pulse_gain
    }
}

/// Voices summed through a single master gain stage.
#[derive(Debug)]
pub struct AudioGraph {
    sample_rate: u32,
    frame: u64,
    master: AudioParam,
    voices: Vec<Voice>,
    next_voice: u64,
}

impl AudioGraph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frame: 0,
            master: AudioParam::new(0.0),
            voices: Vec::new(),
            next_voice: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The next frame the render path will produce.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Render clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn frames_for(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn master(&self) -> &AudioParam {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut AudioParam {
        &mut self.master
    }

    /// Master gain at the current frame.
    pub fn master_gain(&self) -> f32 {
        self.master.value_at(self.frame)
    }

    /// Schedules a voice to begin sounding at `start_frame`.
    pub fn add_voice(&mut self, spec: VoiceSpec, start_frame: u64) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.voices.push(Voice {
            id,
            carrier: Oscillator::new(spec.carrier_hz, self.sample_rate),
            modulator: Oscillator::new(spec.modulation_hz, self.sample_rate),
            baseline_gain: spec.baseline_gain,
            modulation_depth: spec.modulation_depth,
            start_frame,
            stop_frame: None,
        });
        id
    }

    /// Schedules `id` to fall silent at `frame`. An earlier stop already on
    /// the voice is kept. Returns `false` for unknown or finished voices.
    pub fn stop_voice(&mut self, id: VoiceId, frame: u64) -> bool {
        let Some(voice) = self.voices.iter_mut().find(|voice| voice.id == id) else {
            return false;
        };
        let frame = frame.max(voice.start_frame);
        voice.stop_frame = Some(voice.stop_frame.map_or(frame, |stop| stop.min(frame)));
        true
    }

    /// Oscillators sounding at the current frame (two per voice).
    pub fn live_oscillators(&self) -> usize {
        self.voices
            .iter()
            .filter(|voice| voice.sounds_at(self.frame))
            .count()
            * 2
    }

    /// Voices held by the graph, including ones waiting for their start frame.
    pub fn scheduled_voices(&self) -> usize {
        self.voices.len()
    }

    /// Renders interleaved samples, duplicating the mono signal on every
    /// channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let sample = self.next_sample();
            frame.fill(sample);
        }

        let now = self.frame;
        self.voices.retain(|voice| !voice.finished_at(now));
        self.master.advance_to(now);
    }

    /// Renders `frames` mono samples.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render(&mut out, 1);
        out
    }

    fn next_sample(&mut self) -> f32 {
        let frame = self.frame;
        let master = self.master.value_at(frame);
        let mut sum = 0.0;
        for voice in &mut self.voices {
            if voice.sounds_at(frame) {
                sum += voice.next_sample();
            }
        }
        self.frame += 1;
        sum * master
    }
}

/// Shared, thread-safe view over an [`AudioGraph`]. The output stream renders
/// through one clone while the engine schedules through another.
#[derive(Clone)]
pub struct AudioGraphHandle {
    shared: Arc<Mutex<AudioGraph>>,
}

impl AudioGraphHandle {
    pub fn new(graph: AudioGraph) -> Self {
        Self {
            shared: Arc::new(Mutex::new(graph)),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, AudioGraph>> {
        self.shared
            .lock()
            .map_err(|_| AnchorError::msg("audio graph has been poisoned"))
    }

    /// Render callback entry point. Never panics; a poisoned graph renders
    /// silence.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        match self.shared.lock() {
            Ok(mut graph) => graph.render(out, channels),
            Err(_) => out.fill(0.0),
        }
    }
}

impl std::fmt::Debug for AudioGraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphHandle").finish()
    }
}

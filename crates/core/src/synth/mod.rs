use crate::{
    audio::{AudioGraph, AudioGraphHandle, VoiceId, VoiceSpec},
    output::OutputStream,
    AnchorError, Result, ToneConfig,
};

/// Live synthesis resources. Only exists while a session holds the output.
struct AudioGraphHandles {
    graph: AudioGraphHandle,
    stream: Box<dyn OutputStream>,
    voice: Option<VoiceId>,
}

/// Owns the carrier/modulator oscillator pair and the graph they render in.
///
/// The modulator drives the carrier's amplitude around
/// [`ToneConfig::baseline_gain`], so troughs dip in loudness without going
/// silent.
pub struct ToneSynthesizer {
    tone: ToneConfig,
    handles: Option<AudioGraphHandles>,
}

impl ToneSynthesizer {
    pub fn new(tone: ToneConfig) -> Self {
        Self {
            tone,
            handles: None,
        }
    }

    /// Builds a fresh graph at the stream's sample rate and connects it.
    /// Anything previously attached is released first.
    pub fn attach(&mut self, mut stream: Box<dyn OutputStream>) -> Result<()> {
        self.release();

        let graph = AudioGraphHandle::new(AudioGraph::new(stream.sample_rate()));
        stream.connect(graph.clone())?;
        tracing::debug!(
            sample_rate = stream.sample_rate(),
            channels = stream.channels(),
            "tone synthesizer attached to output"
        );
        self.handles = Some(AudioGraphHandles {
            graph,
            stream,
            voice: None,
        });
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.handles.is_some()
    }

    /// Whether a voice is running without a scheduled stop.
    pub fn is_started(&self) -> bool {
        self.handles
            .as_ref()
            .is_some_and(|handles| handles.voice.is_some())
    }

    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        self.handles.as_ref().map(|handles| &handles.graph)
    }

    pub fn start(&mut self, sound_hz: f32, pulse_hz: f32) -> Result<()> {
        let frame = self.attached()?.graph.lock()?.current_frame();
        self.start_at(frame, sound_hz, pulse_hz)
    }

    /// Starts a new voice at `frame`. A running voice is stopped at the same
    /// frame so the two never sound together.
    pub fn start_at(&mut self, frame: u64, sound_hz: f32, pulse_hz: f32) -> Result<()> {
        let spec = VoiceSpec {
            carrier_hz: sound_hz,
            modulation_hz: pulse_hz,
            baseline_gain: self.tone.baseline_gain,
            modulation_depth: self.tone.modulation_depth,
        };
        let AudioGraphHandles { graph, voice, .. } = self.attached_mut()?;
        let mut graph = graph.lock()?;

        if let Some(previous) = voice.take() {
            graph.stop_voice(previous, frame);
        }
        *voice = Some(graph.add_voice(spec, frame));
        tracing::debug!(sound_hz, pulse_hz, frame, "oscillators started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<bool> {
        let Some(handles) = self.handles.as_ref() else {
            return Ok(false);
        };
        let frame = handles.graph.lock()?.current_frame();
        self.stop_at(frame)
    }

    /// Schedules the running voice to stop at `frame`. Returns `false` when
    /// nothing was running.
    pub fn stop_at(&mut self, frame: u64) -> Result<bool> {
        let Some(AudioGraphHandles { graph, voice, .. }) = self.handles.as_mut() else {
            return Ok(false);
        };
        let Some(previous) = voice.take() else {
            return Ok(false);
        };
        graph.lock()?.stop_voice(previous, frame);
        tracing::debug!(frame, "oscillators scheduled to stop");
        Ok(true)
    }

    /// Drops the graph and the output stream.
    pub fn release(&mut self) {
        if let Some(handles) = self.handles.take() {
            tracing::debug!(
                sample_rate = handles.stream.sample_rate(),
                "tone synthesizer released output"
            );
        }
    }

    /// Oscillators sounding at the render clock.
    pub fn live_oscillators(&self) -> usize {
        self.graph()
            .and_then(|graph| graph.lock().ok().map(|graph| graph.live_oscillators()))
            .unwrap_or(0)
    }

    fn attached(&self) -> Result<&AudioGraphHandles> {
        self.handles.as_ref().ok_or_else(not_attached)
    }

    fn attached_mut(&mut self) -> Result<&mut AudioGraphHandles> {
        self.handles.as_mut().ok_or_else(not_attached)
    }
}

impl std::fmt::Debug for ToneSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToneSynthesizer")
            .field("tone", &self.tone)
            .field("attached", &self.is_attached())
            .field("started", &self.is_started())
            .finish()
    }
}

fn not_attached() -> AnchorError {
    AnchorError::msg("tone synthesizer has no audio output attached")
}

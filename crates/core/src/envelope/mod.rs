use crate::{synth::ToneSynthesizer, AnchorError, EnvelopeConfig, Result};

/// Attack and release ramps on the master gain.
///
/// Ramps are written onto the render clock, so they complete on their own
/// schedule. Every transition first cancels whatever is pending and pins the
/// gain at its current value, so two curves never compete for the parameter.
#[derive(Debug, Clone)]
pub struct EnvelopeController {
    config: EnvelopeConfig,
}

impl EnvelopeController {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// Ramps the master gain from silence up to the ceiling and starts the
    /// oscillators on the same frame.
    pub fn start(&self, synth: &mut ToneSynthesizer, sound_hz: f32, pulse_hz: f32) -> Result<()> {
        let graph = synth.graph().cloned().ok_or_else(not_attached)?;
        let start = {
            let mut graph = graph.lock()?;
            let now = graph.current_frame();
            let peak = now + graph.frames_for(self.config.attack_seconds);
            let master = graph.master_mut();
            master.cancel_scheduled_values(now);
            master.set_value_at_time(0.0, now);
            master.linear_ramp_to_value_at_time(self.config.ceiling, peak);
            now
        };
        synth.start_at(start, sound_hz, pulse_hz)?;
        tracing::debug!(attack_seconds = self.config.attack_seconds, "attack scheduled");
        Ok(())
    }

    /// Ramps the master gain from its current value to silence and schedules
    /// the oscillators to stop on the frame the ramp lands. Returns that frame,
    /// or `None` when no output is attached.
    pub fn stop(&self, synth: &mut ToneSynthesizer) -> Result<Option<u64>> {
        let Some(graph) = synth.graph().cloned() else {
            return Ok(None);
        };
        let silent = {
            let mut graph = graph.lock()?;
            let now = graph.current_frame();
            let silent = now + graph.frames_for(self.config.release_seconds);
            fade_to_silence(&mut graph, now, silent);
            silent
        };
        synth.stop_at(silent)?;
        tracing::debug!(release_seconds = self.config.release_seconds, "release scheduled");
        Ok(Some(silent))
    }

    /// Replaces the running voice: a short fade silences it, the new voice
    /// starts on the frame the fade lands, then attacks as usual.
    pub fn restart(&self, synth: &mut ToneSynthesizer, sound_hz: f32, pulse_hz: f32) -> Result<()> {
        let graph = synth.graph().cloned().ok_or_else(not_attached)?;
        let switch = {
            let mut graph = graph.lock()?;
            let now = graph.current_frame();
            let switch = now + graph.frames_for(self.config.restart_fade_seconds).max(1);
            let peak = switch + graph.frames_for(self.config.attack_seconds);
            fade_to_silence(&mut graph, now, switch);
            graph
                .master_mut()
                .linear_ramp_to_value_at_time(self.config.ceiling, peak);
            switch
        };
        synth.start_at(switch, sound_hz, pulse_hz)?;
        tracing::debug!(
            fade_seconds = self.config.restart_fade_seconds,
            "restart crossover scheduled"
        );
        Ok(())
    }
}

fn fade_to_silence(graph: &mut crate::audio::AudioGraph, now: u64, silent: u64) {
    let current = graph.master().value_at(now);
    let master = graph.master_mut();
    master.cancel_scheduled_values(now);
    master.set_value_at_time(current, now);
    master.linear_ramp_to_value_at_time(0.0, silent);
}

fn not_attached() -> AnchorError {
    AnchorError::msg("envelope requires an attached tone synthesizer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        output::{AudioOutput, OfflineOutput},
        ToneConfig,
    };

    const RATE: u32 = 1_000;

    fn setup() -> (EnvelopeController, ToneSynthesizer, OfflineOutput) {
        let mut output = OfflineOutput::new(RATE, 1);
        let mut synth = ToneSynthesizer::new(ToneConfig::default());
        synth.attach(output.open().unwrap()).unwrap();
        (
            EnvelopeController::new(EnvelopeConfig::default()),
            synth,
            output,
        )
    }

    /// Master gain sampled once per rendered frame.
    fn gain_trace(synth: &ToneSynthesizer, output: &OfflineOutput, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|_| {
                let gain = synth.graph().unwrap().lock().unwrap().master_gain();
                output.render(1).unwrap();
                gain
            })
            .collect()
    }

    fn non_decreasing(values: &[f32]) -> bool {
        values.windows(2).all(|pair| pair[1] >= pair[0] - 1e-6)
    }

    fn non_increasing(values: &[f32]) -> bool {
        values.windows(2).all(|pair| pair[1] <= pair[0] + 1e-6)
    }

    #[test]
    fn attack_rises_monotonically_to_ceiling() {
        let (envelope, mut synth, output) = setup();
        envelope.start(&mut synth, 200.0, 5.0).unwrap();

        let trace = gain_trace(&synth, &output, 1_600);
        assert_eq!(trace[0], 0.0);
        assert!(non_decreasing(&trace));
        assert!((trace[1_500] - 0.8).abs() < 1e-6);
        assert!((trace[1_599] - 0.8).abs() < 1e-6);
        assert_eq!(synth.live_oscillators(), 2);
    }

    #[test]
    fn release_falls_monotonically_and_stops_oscillators() {
        let (envelope, mut synth, output) = setup();
        envelope.start(&mut synth, 200.0, 5.0).unwrap();
        output.render(2_000).unwrap();

        let silent = envelope.stop(&mut synth).unwrap().unwrap();
        assert_eq!(silent, 3_000);

        let trace = gain_trace(&synth, &output, 1_000);
        assert!((trace[0] - 0.8).abs() < 1e-6);
        assert!(non_increasing(&trace));
        assert_eq!(synth.live_oscillators(), 0);
        assert_eq!(synth.graph().unwrap().lock().unwrap().master_gain(), 0.0);
    }

    #[test]
    fn stop_mid_attack_releases_from_current_value() {
        let (envelope, mut synth, output) = setup();
        envelope.start(&mut synth, 200.0, 5.0).unwrap();
        output.render(750).unwrap();

        envelope.stop(&mut synth).unwrap();
        let trace = gain_trace(&synth, &output, 1_001);
        assert!((trace[0] - 0.4).abs() < 1e-3);
        assert!(non_increasing(&trace));
        assert_eq!(trace[1_000], 0.0);
    }

    #[test]
    fn restart_fades_out_before_the_new_voice_attacks() {
        let (envelope, mut synth, output) = setup();
        envelope.start(&mut synth, 200.0, 5.0).unwrap();
        output.render(2_000).unwrap();

        envelope.restart(&mut synth, 300.0, 4.0).unwrap();
        let mut max_live = 0;
        let mut trace = Vec::new();
        for _ in 0..1_600 {
            max_live = max_live.max(synth.live_oscillators());
            trace.push(synth.graph().unwrap().lock().unwrap().master_gain());
            output.render(1).unwrap();
        }

        assert_eq!(max_live, 2);
        assert!(non_increasing(&trace[..=10]));
        assert_eq!(trace[10], 0.0);
        assert!(non_decreasing(&trace[10..]));
        assert!((trace[1_510] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn stop_without_output_is_a_no_op() {
        let envelope = EnvelopeController::new(EnvelopeConfig::default());
        let mut synth = ToneSynthesizer::new(ToneConfig::default());
        assert_eq!(envelope.stop(&mut synth).unwrap(), None);
        assert!(envelope.start(&mut synth, 200.0, 5.0).is_err());
    }
}

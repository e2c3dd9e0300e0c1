use std::{cmp::Ordering, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AnchorError, Result};

/// Length of each RMS window in the loudness envelope.
const ENVELOPE_WINDOW_SECONDS: f32 = 0.01;
/// Envelopes flatter than this fraction of their mean count as unmodulated.
const MIN_MODULATION_SPREAD: f32 = 1e-3;

/// Measurements of a rendered signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSummary {
    pub sample_rate: u32,
    pub duration_seconds: f32,
    pub rms: f32,
    /// Strongest non-DC spectral component.
    pub peak_hz: f32,
    pub spectral_centroid_hz: f32,
    /// Quietest and loudest 10 ms RMS windows.
    pub envelope_floor: f32,
    pub envelope_ceiling: f32,
    /// Dominant rate of the loudness envelope, if it moves at all.
    pub modulation_hz: Option<f32>,
}

/// FFT-backed probe used to check that rendered output matches the session
/// parameters: carrier on pitch, throb at the pulse rate, no silent troughs.
pub struct SignalProbe {
    sample_rate: u32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SignalProbe {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Analyses a mono block.
    pub fn analyse(&mut self, samples: &[f32]) -> Result<SignalSummary> {
        if samples.len() < 2 {
            return Err(AnchorError::msg(
                "analysis requires blocks with at least two samples",
            ));
        }

        let sample_rate = self.sample_rate as f32;
        let spectrum = self.magnitude_spectrum(samples)?;
        let bin_hz = sample_rate / samples.len() as f32;

        let window = ((sample_rate * ENVELOPE_WINDOW_SECONDS) as usize).max(1);
        let envelope: Vec<f32> = samples.chunks_exact(window).map(compute_rms).collect();
        let (envelope_floor, envelope_ceiling) = if envelope.is_empty() {
            (0.0, 0.0)
        } else {
            envelope
                .iter()
                .fold((f32::INFINITY, 0.0_f32), |(lo, hi), value| {
                    (lo.min(*value), hi.max(*value))
                })
        };
        let modulation_hz = self.modulation_rate(&envelope, sample_rate / window as f32)?;

        Ok(SignalSummary {
            sample_rate: self.sample_rate,
            duration_seconds: samples.len() as f32 / sample_rate,
            rms: compute_rms(samples),
            peak_hz: peak_bin(&spectrum)
                .map(|bin| bin as f32 * bin_hz)
                .unwrap_or(0.0),
            spectral_centroid_hz: spectral_centroid(&spectrum, bin_hz),
            envelope_floor,
            envelope_ceiling,
            modulation_hz,
        })
    }

    fn modulation_rate(&mut self, envelope: &[f32], envelope_rate: f32) -> Result<Option<f32>> {
        if envelope.len() < 4 {
            return Ok(None);
        }

        let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
        let spread = envelope
            .iter()
            .map(|value| (value - mean).abs())
            .fold(0.0_f32, f32::max);
        if spread <= mean * MIN_MODULATION_SPREAD {
            return Ok(None);
        }

        let centered: Vec<f32> = envelope.iter().map(|value| value - mean).collect();
        let spectrum = self.magnitude_spectrum(&centered)?;
        let bin_hz = envelope_rate / envelope.len() as f32;
        Ok(peak_bin(&spectrum).map(|bin| bin as f32 * bin_hz))
    }

    fn magnitude_spectrum(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let len = samples.len();
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| AnchorError::msg(format!("spectrum analysis failed: {err}")))?;

        Ok(fft.spectrum.iter().map(|bin| bin.norm()).collect())
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(true, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SignalProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalProbe")
            .field("sample_rate", &self.sample_rate)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn peak_bin(spectrum: &[f32]) -> Option<usize> {
    spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .filter(|(_, magnitude)| **magnitude > f32::EPSILON)
        .map(|(bin, _)| bin)
}

fn spectral_centroid(spectrum: &[f32], bin_hz: f32) -> f32 {
    let mut magnitude_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (bin, magnitude) in spectrum.iter().enumerate() {
        magnitude_sum += magnitude;
        weighted_sum += magnitude * (bin as f32 * bin_hz);
    }

    if magnitude_sum <= f32::EPSILON {
        0.0
    } else {
        weighted_sum / magnitude_sum
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

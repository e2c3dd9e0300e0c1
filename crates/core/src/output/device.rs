use std::sync::{Arc, Mutex};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SizedSample,
};

use super::{AudioOutput, OutputStream};
use crate::{audio::AudioGraphHandle, AnchorError, Result};

type GraphSlot = Arc<Mutex<Option<AudioGraphHandle>>>;

/// The host's default output device.
#[derive(Debug, Default)]
pub struct DeviceOutput;

impl DeviceOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for DeviceOutput {
    fn open(&mut self) -> Result<Box<dyn OutputStream>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| unavailable("no default output device"))?;
        let config = device.default_output_config().map_err(unavailable)?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let stream_config: cpal::StreamConfig = config.clone().into();
        let slot: GraphSlot = Arc::new(Mutex::new(None));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, slot.clone()),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, slot.clone()),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, slot.clone()),
            other => {
                return Err(unavailable(format!(
                    "unsupported output sample format: {other:?}"
                )))
            }
        }
        .map_err(unavailable)?;

        stream.play().map_err(unavailable)?;
        tracing::info!(sample_rate, channels, "audio output acquired");

        Ok(Box::new(DeviceStream {
            _stream: stream,
            slot,
            sample_rate,
            channels,
        }))
    }
}

struct DeviceStream {
    _stream: cpal::Stream,
    slot: GraphSlot,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream for DeviceStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn connect(&mut self, graph: AudioGraphHandle) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| AnchorError::msg("output graph slot has been poisoned"))?;
        *slot = Some(graph);
        Ok(())
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        tracing::info!("audio output released");
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    slot: GraphSlot,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            let graph = slot.lock().ok().and_then(|graph| graph.clone());
            match graph {
                Some(graph) => graph.render(&mut scratch, channels),
                None => scratch.fill(0.0),
            }
            for (out, sample) in data.iter_mut().zip(&scratch) {
                *out = T::from_sample(*sample);
            }
        },
        |err| tracing::warn!(%err, "audio stream error"),
        None,
    )
}

fn unavailable(err: impl ToString) -> AnchorError {
    AnchorError::OutputUnavailable(err.to_string())
}

//! Scoped acquisition of the audio output resource.
//!
//! A session opens an [`OutputStream`] when it starts and drops it when it
//! ends; dropping the stream releases the device.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{audio::AudioGraphHandle, AnchorError, Result};

#[cfg(feature = "cpal")]
mod device;

#[cfg(feature = "cpal")]
pub use device::DeviceOutput;

/// Provider of output streams, typically the platform's default device.
pub trait AudioOutput {
    /// Attempts to (re)acquire the output. Failure is reported as
    /// [`AnchorError::OutputUnavailable`] so the caller can retry.
    fn open(&mut self) -> Result<Box<dyn OutputStream>>;
}

/// A live output stream. It pulls samples from the connected graph on its own
/// clock until dropped.
pub trait OutputStream {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn connect(&mut self, graph: AudioGraphHandle) -> Result<()>;
}

/// Output whose render clock only advances when [`render`](Self::render) is
/// called. Used for deterministic tests and offline probing.
#[derive(Clone)]
pub struct OfflineOutput {
    shared: Arc<Mutex<OfflineState>>,
}

#[derive(Debug)]
struct OfflineState {
    sample_rate: u32,
    channels: u16,
    available: bool,
    opened: usize,
    live_streams: usize,
    graph: Option<AudioGraphHandle>,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            shared: Arc::new(Mutex::new(OfflineState {
                sample_rate,
                channels: channels.max(1),
                available: true,
                opened: 0,
                live_streams: 0,
                graph: None,
            })),
        }
    }

    /// Simulates a blocked device (for example one that needs a user gesture).
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.lock() {
            state.available = available;
        }
    }

    /// Number of successful acquisitions so far.
    pub fn open_count(&self) -> usize {
        self.lock().map(|state| state.opened).unwrap_or(0)
    }

    /// Whether a stream is currently held.
    pub fn is_open(&self) -> bool {
        self.lock().map(|state| state.live_streams > 0).unwrap_or(false)
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().map(|state| state.sample_rate).unwrap_or(0)
    }

    /// Pulls `frames` interleaved frames from the connected graph. Renders
    /// silence while nothing is connected.
    pub fn render(&self, frames: usize) -> Result<Vec<f32>> {
        let (graph, channels) = {
            let state = self.lock()?;
            (state.graph.clone(), usize::from(state.channels))
        };
        let mut out = vec![0.0; frames * channels];
        if let Some(graph) = graph {
            graph.render(&mut out, channels);
        }
        Ok(out)
    }

    fn lock(&self) -> Result<MutexGuard<'_, OfflineState>> {
        self.shared
            .lock()
            .map_err(|_| AnchorError::msg("offline output has been poisoned"))
    }
}

impl std::fmt::Debug for OfflineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineOutput").finish()
    }
}

impl AudioOutput for OfflineOutput {
    fn open(&mut self) -> Result<Box<dyn OutputStream>> {
        let mut state = self.lock()?;
        if !state.available {
            return Err(AnchorError::OutputUnavailable(
                "offline output is blocked".to_string(),
            ));
        }
        state.opened += 1;
        state.live_streams += 1;
        Ok(Box::new(OfflineStream {
            shared: self.shared.clone(),
            sample_rate: state.sample_rate,
            channels: state.channels,
        }))
    }
}

struct OfflineStream {
    shared: Arc<Mutex<OfflineState>>,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream for OfflineStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn connect(&mut self, graph: AudioGraphHandle) -> Result<()> {
        let mut state = self
            .shared
            .lock()
            .map_err(|_| AnchorError::msg("offline output has been poisoned"))?;
        state.graph = Some(graph);
        Ok(())
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.lock() {
            state.graph = None;
            state.live_streams = state.live_streams.saturating_sub(1);
        }
    }
}

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::timeline::{CoarseTimers, TimerId, TimerKind};

/// Device vibration motor. Actuators are plain on/off motors; only the on
/// duration of each pulse can be chosen.
pub trait HapticActuator {
    fn is_available(&self) -> bool {
        true
    }

    /// Drives the motor for `duration`, then lets it fall idle.
    fn vibrate(&mut self, duration: Duration);

    /// Forces the motor off immediately.
    fn cancel(&mut self);
}

/// Stand-in for devices without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl HapticActuator for NoHaptics {
    fn is_available(&self) -> bool {
        false
    }

    fn vibrate(&mut self, _duration: Duration) {}

    fn cancel(&mut self) {}
}

/// Emits every pulse as a trace event. Useful on hosts without a motor when
/// the pulse train itself needs inspecting.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActuator;

impl HapticActuator for TracingActuator {
    fn vibrate(&mut self, duration: Duration) {
        tracing::trace!(on_ms = duration.as_millis() as u64, "haptic pulse");
    }

    fn cancel(&mut self) {
        tracing::trace!("haptic actuator off");
    }
}

/// Something the test actuator saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticCommand {
    Vibrate(Duration),
    Cancel,
}

/// Records every command it receives. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<Vec<HapticCommand>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<HapticCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn pulses(&self) -> usize {
        self.commands()
            .iter()
            .filter(|command| matches!(command, HapticCommand::Vibrate(_)))
            .count()
    }

    fn record(&self, command: HapticCommand) {
        if let Ok(mut log) = self.log.lock() {
            log.push(command);
        }
    }
}

impl HapticActuator for RecordingActuator {
    fn vibrate(&mut self, duration: Duration) {
        self.record(HapticCommand::Vibrate(duration));
    }

    fn cancel(&mut self) {
        self.record(HapticCommand::Cancel);
    }
}

/// On/off split of one pulse cycle, in whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HapticPattern {
    pub on: Duration,
    pub off: Duration,
}

impl HapticPattern {
    /// Splits a `1000 / pulse_hz` millisecond cycle into `duty_cycle` on and
    /// the remainder off, each rounded down to the millisecond.
    pub fn from_pulse_rate(pulse_hz: f32, duty_cycle: f32) -> Self {
        let cycle_ms = 1000.0 / f64::from(pulse_hz);
        let duty = f64::from(duty_cycle);
        Self {
            on: whole_millis(cycle_ms * duty),
            off: whole_millis(cycle_ms * (1.0 - duty)),
        }
    }

    /// Repeat period of the pulse loop; never shorter than one millisecond.
    pub fn period(&self) -> Duration {
        (self.on + self.off).max(Duration::from_millis(1))
    }
}

// Tolerates up to 1 µs of float noise so 200 ms * 0.6 stays 120 ms.
fn whole_millis(ms: f64) -> Duration {
    Duration::from_millis((ms + 1e-3).floor().max(0.0) as u64)
}

#[derive(Debug, Clone, Copy)]
struct RunningPattern {
    timer: TimerId,
    pattern: HapticPattern,
}

/// Free-running pulse loop locked to the session's pulse rate.
pub struct HapticScheduler {
    actuator: Box<dyn HapticActuator>,
    duty_cycle: f32,
    running: Option<RunningPattern>,
}

impl HapticScheduler {
    pub fn new(actuator: Box<dyn HapticActuator>, duty_cycle: f32) -> Self {
        Self {
            actuator,
            duty_cycle,
            running: None,
        }
    }

    /// Fires one pulse immediately and repeats every on+off period. Returns
    /// `None` without error when the device has no actuator.
    pub fn start(&mut self, pulse_hz: f32, timers: &mut CoarseTimers) -> Option<HapticPattern> {
        self.stop(timers);

        if !self.actuator.is_available() {
            tracing::debug!("haptics unavailable; continuing audio-only");
            return None;
        }

        let pattern = HapticPattern::from_pulse_rate(pulse_hz, self.duty_cycle);
        self.actuator.vibrate(pattern.on);
        let timer = timers.schedule_repeating(pattern.period(), TimerKind::HapticPulse);
        self.running = Some(RunningPattern { timer, pattern });
        tracing::debug!(
            on_ms = pattern.on.as_millis() as u64,
            off_ms = pattern.off.as_millis() as u64,
            "haptic loop started"
        );
        Some(pattern)
    }

    /// Timer callback; drives one pulse if the loop is running.
    pub fn pulse(&mut self) {
        if let Some(running) = self.running {
            self.actuator.vibrate(running.pattern.on);
        }
    }

    /// Cancels the loop and forces the motor off. Returns `false` if nothing
    /// was running.
    pub fn stop(&mut self, timers: &mut CoarseTimers) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        timers.cancel(running.timer);
        self.actuator.cancel();
        tracing::debug!("haptic loop stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn timer(&self) -> Option<TimerId> {
        self.running.map(|running| running.timer)
    }

    pub fn pattern(&self) -> Option<HapticPattern> {
        self.running.map(|running| running.pattern)
    }
}

impl std::fmt::Debug for HapticScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticScheduler")
            .field("duty_cycle", &self.duty_cycle)
            .field("running", &self.running)
            .finish()
    }
}

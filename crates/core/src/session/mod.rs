//! Session lifecycle: the only public start/stop/restart contract.
//!
//! ```text
//! Idle -> Active -> Stopping -> Idle
//! ```
//!
//! The controller owns no thread. The host calls [`SessionController::advance`]
//! with the wall-clock time that passed; countdown ticks, haptic pulses and the
//! post-stop delay fire from there, while audio ramps run on the output's own
//! render clock.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    envelope::EnvelopeController,
    haptics::{HapticActuator, HapticPattern, HapticScheduler},
    output::AudioOutput,
    synth::ToneSynthesizer,
    timeline::{CoarseTimers, FiredTimer, TimerId, TimerKind},
    AnchorError, EngineConfig, Result,
};

/// Numeric inputs for one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    /// Carrier tone frequency.
    pub sound_hz: f32,
    /// Amplitude-modulation and haptic pulse rate.
    pub pulse_hz: f32,
    /// Nominal vibration frequency. Carried through but not synthesized:
    /// the actuator follows `pulse_hz`.
    pub vibration_hz: f32,
}

impl SessionParameters {
    pub fn new(sound_hz: f32, pulse_hz: f32, vibration_hz: f32) -> Self {
        Self {
            sound_hz,
            pulse_hz,
            vibration_hz,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sound_hz", self.sound_hz),
            ("pulse_hz", self.pulse_hz),
            ("vibration_hz", self.vibration_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnchorError::InvalidParameter { name, value });
            }
        }
        // The pulse loop and countdown run on `Duration`s; a rate this slow has
        // no representable period.
        if Duration::try_from_secs_f64(1.0 / f64::from(self.pulse_hz)).is_err() {
            return Err(AnchorError::InvalidParameter {
                name: "pulse_hz",
                value: self.pulse_hz,
            });
        }
        Ok(())
    }

    /// Duration of one amplitude/haptic pulse. Display layers animate on it.
    /// Saturates for rates that fail [`validate`](Self::validate).
    pub fn pulse_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / f64::from(self.pulse_hz)).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Completed,
    Superseded,
}

/// Notifications delivered through [`SessionController::advance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session: SessionId,
        parameters: SessionParameters,
        duration_seconds: u32,
        pulse_period_ms: f64,
        haptics: Option<HapticPattern>,
    },
    Tick {
        session: SessionId,
        remaining_seconds: u32,
    },
    Stopping {
        session: SessionId,
        reason: StopReason,
    },
    /// Fired once per started session after its resources are released.
    Ended { session: SessionId },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match *self {
            Self::Started { session, .. }
            | Self::Tick { session, .. }
            | Self::Stopping { session, .. }
            | Self::Ended { session } => session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A running session was torn down and replaced.
    Restarted {
        previous: SessionId,
        current: SessionId,
    },
    /// The engine was still winding down a previous session.
    Ignored,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: SessionId,
    parameters: SessionParameters,
    remaining: u32,
    countdown: Option<TimerId>,
}

/// Coordinates the tone synthesizer, envelope, haptics and countdown.
pub struct SessionController {
    config: EngineConfig,
    output: Box<dyn AudioOutput>,
    synth: ToneSynthesizer,
    envelope: EnvelopeController,
    haptics: HapticScheduler,
    timers: CoarseTimers,
    state: EngineState,
    session: Option<ActiveSession>,
    stop_timer: Option<TimerId>,
    next_session: u64,
    events: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(
        config: EngineConfig,
        output: impl AudioOutput + 'static,
        actuator: impl HapticActuator + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            synth: ToneSynthesizer::new(config.tone.clone()),
            envelope: EnvelopeController::new(config.envelope.clone()),
            haptics: HapticScheduler::new(Box::new(actuator), config.haptics.duty_cycle),
            output: Box::new(output),
            config,
            timers: CoarseTimers::new(),
            state: EngineState::Idle,
            session: None,
            stop_timer: None,
            next_session: 1,
            events: Vec::new(),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn parameters(&self) -> Option<SessionParameters> {
        self.session.as_ref().map(|session| session.parameters)
    }

    /// Countdown seconds left; `None` when idle.
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.remaining)
    }

    pub fn pulse_period(&self) -> Option<Duration> {
        self.parameters().map(|parameters| parameters.pulse_period())
    }

    pub fn haptic_pattern(&self) -> Option<HapticPattern> {
        self.haptics.pattern()
    }

    pub fn live_oscillators(&self) -> usize {
        self.synth.live_oscillators()
    }

    /// Master gain at the render clock; zero without an output.
    pub fn master_gain(&self) -> f32 {
        self.synth
            .graph()
            .and_then(|graph| graph.lock().ok().map(|graph| graph.master_gain()))
            .unwrap_or(0.0)
    }

    /// Time on the coarse clock.
    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Starts a session, restarting any active one.
    ///
    /// Parameters are validated before any resource is touched. If the audio
    /// output cannot be acquired the engine stays idle and the returned error
    /// is recoverable.
    pub fn start(
        &mut self,
        parameters: SessionParameters,
        duration_seconds: u32,
    ) -> Result<StartOutcome> {
        parameters.validate()?;
        if duration_seconds == 0 {
            return Err(AnchorError::InvalidDuration);
        }

        match self.state {
            EngineState::Idle => self.start_from_idle(parameters, duration_seconds),
            EngineState::Active => self.restart(parameters, duration_seconds),
            EngineState::Stopping => {
                tracing::debug!("start ignored while previous session winds down");
                Ok(StartOutcome::Ignored)
            }
        }
    }

    /// Begins the graceful stop sequence. Returns `false` (and does nothing)
    /// unless a session is active.
    pub fn stop(&mut self) -> bool {
        self.begin_stop(StopReason::Manual)
    }

    /// Advances the coarse clock by `elapsed`, firing due timers in order, and
    /// returns every event raised since the previous call.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<SessionEvent> {
        let until = self.timers.now() + elapsed;
        while let Some(fired) = self.timers.pop_due(until) {
            self.on_timer(fired);
        }
        self.timers.advance_to(until);
        self.drain_events()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Releases every resource immediately, whatever the state. A live
    /// session still receives its `Ended` event.
    pub fn teardown(&mut self) -> Vec<SessionEvent> {
        if let Some(timer) = self.stop_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(session) = self.session.take() {
            if let Some(timer) = session.countdown {
                self.timers.cancel(timer);
            }
            tracing::info!(session = %session.id, "session torn down");
            self.events.push(SessionEvent::Ended { session: session.id });
        }
        self.haptics.stop(&mut self.timers);
        self.synth.release();
        self.state = EngineState::Idle;
        self.drain_events()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn start_from_idle(
        &mut self,
        parameters: SessionParameters,
        duration_seconds: u32,
    ) -> Result<StartOutcome> {
        let stream = self.output.open().map_err(|err| {
            tracing::warn!(%err, "audio output could not be acquired");
            err
        })?;

        let started = self.synth.attach(stream).and_then(|()| {
            self.envelope
                .start(&mut self.synth, parameters.sound_hz, parameters.pulse_hz)
        });
        if let Err(err) = started {
            self.synth.release();
            return Err(err);
        }

        let id = self.begin_session(parameters, duration_seconds);
        Ok(StartOutcome::Started(id))
    }

    fn restart(
        &mut self,
        parameters: SessionParameters,
        duration_seconds: u32,
    ) -> Result<StartOutcome> {
        let Some(previous) = self.session.take() else {
            return self.start_from_idle(parameters, duration_seconds);
        };
        if let Some(timer) = previous.countdown {
            self.timers.cancel(timer);
        }
        self.haptics.stop(&mut self.timers);

        if let Err(err) = self.envelope.restart(
            &mut self.synth,
            parameters.sound_hz,
            parameters.pulse_hz,
        ) {
            self.synth.release();
            self.state = EngineState::Idle;
            self.events.push(SessionEvent::Ended {
                session: previous.id,
            });
            return Err(err);
        }

        tracing::info!(session = %previous.id, "session superseded");
        self.events.push(SessionEvent::Stopping {
            session: previous.id,
            reason: StopReason::Superseded,
        });
        self.events.push(SessionEvent::Ended {
            session: previous.id,
        });

        let current = self.begin_session(parameters, duration_seconds);
        Ok(StartOutcome::Restarted {
            previous: previous.id,
            current,
        })
    }

    fn begin_session(&mut self, parameters: SessionParameters, duration_seconds: u32) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;

        let haptics = self.haptics.start(parameters.pulse_hz, &mut self.timers);
        let countdown = self
            .timers
            .schedule_repeating(self.config.session.tick_interval(), TimerKind::CountdownTick);

        self.session = Some(ActiveSession {
            id,
            parameters,
            remaining: duration_seconds,
            countdown: Some(countdown),
        });
        self.state = EngineState::Active;

        tracing::info!(
            session = %id,
            sound_hz = parameters.sound_hz,
            pulse_hz = parameters.pulse_hz,
            vibration_hz = parameters.vibration_hz,
            duration_seconds,
            "session started"
        );
        self.events.push(SessionEvent::Started {
            session: id,
            parameters,
            duration_seconds,
            pulse_period_ms: parameters.pulse_period().as_secs_f64() * 1000.0,
            haptics,
        });
        id
    }

    fn begin_stop(&mut self, reason: StopReason) -> bool {
        if self.state != EngineState::Active {
            tracing::debug!(state = ?self.state, "stop ignored");
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(timer) = session.countdown.take() {
            self.timers.cancel(timer);
        }
        let id = session.id;
        self.state = EngineState::Stopping;

        if let Err(err) = self.envelope.stop(&mut self.synth) {
            tracing::warn!(%err, "release ramp could not be scheduled; cutting output");
            self.synth.release();
        }
        self.haptics.stop(&mut self.timers);
        self.stop_timer = Some(
            self.timers
                .schedule_once(self.config.session.post_stop_delay(), TimerKind::StopComplete),
        );

        tracing::info!(session = %id, ?reason, "session stopping");
        self.events.push(SessionEvent::Stopping {
            session: id,
            reason,
        });
        true
    }

    fn finish_stop(&mut self) {
        self.stop_timer = None;
        self.synth.release();
        self.state = EngineState::Idle;
        if let Some(session) = self.session.take() {
            tracing::info!(session = %session.id, "session ended");
            self.events.push(SessionEvent::Ended { session: session.id });
        }
    }

    fn on_timer(&mut self, fired: FiredTimer) {
        match fired.kind {
            TimerKind::CountdownTick => self.on_countdown_tick(fired.id),
            TimerKind::HapticPulse => {
                if self.haptics.timer() == Some(fired.id) {
                    self.haptics.pulse();
                }
            }
            TimerKind::StopComplete => {
                if self.stop_timer == Some(fired.id) {
                    self.finish_stop();
                }
            }
        }
    }

    fn on_countdown_tick(&mut self, timer: TimerId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.countdown != Some(timer) {
            return;
        }
        session.remaining = session.remaining.saturating_sub(1);
        let (id, remaining) = (session.id, session.remaining);
        tracing::debug!(session = %id, remaining, "countdown tick");
        self.events.push(SessionEvent::Tick {
            session: id,
            remaining_seconds: remaining,
        });

        if remaining == 0 {
            self.begin_stop(StopReason::Completed);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.state != EngineState::Idle {
            self.haptics.stop(&mut self.timers);
            self.synth.release();
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("synth", &self.synth)
            .field("haptics", &self.haptics)
            .field("now", &self.timers.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::SignalProbe,
        haptics::{HapticCommand, NoHaptics, RecordingActuator},
        output::OfflineOutput,
    };

    const RATE: u32 = 8_000;
    const STEP: Duration = Duration::from_millis(10);

    struct Harness {
        controller: SessionController,
        output: OfflineOutput,
        actuator: RecordingActuator,
    }

    impl Harness {
        fn new() -> Self {
            let mut config = EngineConfig::default();
            config.audio.sample_rate = RATE;
            let output = OfflineOutput::new(RATE, 1);
            let actuator = RecordingActuator::new();
            let controller =
                SessionController::new(config, output.clone(), actuator.clone()).unwrap();
            Self {
                controller,
                output,
                actuator,
            }
        }

        /// Advances coarse time and the render clock together, returning the
        /// events and the rendered mono samples.
        fn run_for(&mut self, duration: Duration) -> (Vec<SessionEvent>, Vec<f32>) {
            let steps = duration.as_millis() / STEP.as_millis();
            let frames_per_step = (RATE as u128 * STEP.as_millis() / 1000) as usize;
            let mut events = Vec::new();
            let mut samples = Vec::new();
            for _ in 0..steps {
                samples.extend(self.output.render(frames_per_step).unwrap());
                events.extend(self.controller.advance(STEP));
            }
            (events, samples)
        }
    }

    fn params() -> SessionParameters {
        SessionParameters::new(136.1, 4.5, 4.5)
    }

    fn ended(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Ended { .. }))
            .count()
    }

    fn stopping(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Stopping { .. }))
            .count()
    }

    #[test]
    fn rejects_invalid_frequencies_before_touching_resources() {
        let mut harness = Harness::new();
        for parameters in [
            SessionParameters::new(0.0, 4.5, 4.5),
            SessionParameters::new(136.1, -1.0, 4.5),
            SessionParameters::new(136.1, 4.5, f32::NAN),
        ] {
            let err = harness.controller.start(parameters, 60).unwrap_err();
            assert!(matches!(err, AnchorError::InvalidParameter { .. }));
        }
        assert!(matches!(
            harness.controller.start(params(), 0),
            Err(AnchorError::InvalidDuration)
        ));

        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert_eq!(harness.output.open_count(), 0);
        assert!(harness.actuator.commands().is_empty());
    }

    #[test]
    fn rejects_pulse_rate_without_representable_period() {
        let mut harness = Harness::new();
        let slow = SessionParameters::new(136.1, 1e-20, 4.5);
        assert_eq!(slow.pulse_period(), Duration::MAX);

        let err = harness.controller.start(slow, 60).unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InvalidParameter {
                name: "pulse_hz",
                ..
            }
        ));
        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert_eq!(harness.output.open_count(), 0);
        assert!(!harness.output.is_open());

        let slowest_valid = SessionParameters::new(136.1, 1e-3, 4.5);
        assert!(slowest_valid.validate().is_ok());
        assert!((slowest_valid.pulse_period().as_secs_f64() - 1_000.0).abs() < 1e-3);
    }

    #[test]
    fn blocked_output_leaves_engine_idle_and_retry_succeeds() {
        let mut harness = Harness::new();
        harness.output.set_available(false);

        let err = harness.controller.start(params(), 45).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert!(harness.actuator.commands().is_empty());
        assert!(harness.controller.advance(STEP).is_empty());

        harness.output.set_available(true);
        let outcome = harness.controller.start(params(), 45).unwrap();
        assert!(matches!(outcome, StartOutcome::Started(_)));
        assert_eq!(harness.controller.state(), EngineState::Active);
    }

    #[test]
    fn start_brings_up_one_oscillator_pair_and_stop_removes_it() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();
        assert_eq!(harness.controller.live_oscillators(), 2);
        assert!(harness.output.is_open());

        harness.run_for(Duration::from_secs(2));
        assert!(harness.controller.stop());
        assert_eq!(harness.controller.state(), EngineState::Stopping);

        let (events, _) = harness.run_for(Duration::from_millis(1_000));
        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert_eq!(harness.controller.live_oscillators(), 0);
        assert!(!harness.output.is_open());
        assert_eq!(ended(&events), 1);
    }

    #[test]
    fn stopping_twice_matches_stopping_once() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();
        assert!(harness.controller.stop());
        assert!(!harness.controller.stop());

        let (events, _) = harness.run_for(Duration::from_secs(2));
        assert_eq!(stopping(&events), 1);
        assert_eq!(ended(&events), 1);
        assert!(!harness.controller.stop());
        assert_eq!(harness.controller.state(), EngineState::Idle);
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut harness = Harness::new();
        assert!(!harness.controller.stop());
        assert!(harness.controller.advance(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn start_while_stopping_is_ignored() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();
        harness.controller.stop();

        let outcome = harness.controller.start(params(), 45).unwrap();
        assert_eq!(outcome, StartOutcome::Ignored);
        assert_eq!(harness.controller.state(), EngineState::Stopping);
        assert_eq!(harness.output.open_count(), 1);
    }

    #[test]
    fn restart_never_exceeds_one_oscillator_pair() {
        let mut harness = Harness::new();
        let first = match harness.controller.start(params(), 60).unwrap() {
            StartOutcome::Started(id) => id,
            other => panic!("unexpected outcome {other:?}"),
        };
        harness.run_for(Duration::from_secs(3));

        let outcome = harness
            .controller
            .start(SessionParameters::new(210.4, 6.0, 6.0), 45)
            .unwrap();
        let StartOutcome::Restarted { previous, current } = outcome else {
            panic!("expected a restart, got {outcome:?}");
        };
        assert_eq!(previous, first);
        assert_ne!(current, first);

        let mut max_live = 0;
        for _ in 0..RATE {
            max_live = max_live.max(harness.controller.live_oscillators());
            harness.output.render(1).unwrap();
        }
        assert_eq!(max_live, 2);
        assert_eq!(harness.controller.live_oscillators(), 2);
        assert_eq!(harness.controller.remaining_seconds(), Some(45));
        assert_eq!(harness.output.open_count(), 1);

        let events = harness.controller.drain_events();
        let superseded: Vec<_> = events
            .iter()
            .filter(|event| event.session() == first)
            .collect();
        assert!(matches!(
            superseded[..],
            [
                SessionEvent::Stopping {
                    reason: StopReason::Superseded,
                    ..
                },
                SessionEvent::Ended { .. }
            ]
        ));
    }

    #[test]
    fn restart_replaces_the_haptic_loop() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 60).unwrap();
        harness
            .controller
            .start(SessionParameters::new(136.1, 5.0, 5.0), 60)
            .unwrap();

        let pattern = harness.controller.haptic_pattern().unwrap();
        assert_eq!(pattern.on, Duration::from_millis(80));
        let commands = harness.actuator.commands();
        assert_eq!(commands[1], HapticCommand::Cancel);
        assert_eq!(commands[2], HapticCommand::Vibrate(Duration::from_millis(80)));
    }

    #[test]
    fn countdown_triggers_exactly_one_automatic_stop() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();

        let mut events = harness.controller.drain_events();
        for _ in 0..45 {
            events.extend(harness.controller.advance(Duration::from_secs(1)));
        }
        assert_eq!(harness.controller.state(), EngineState::Stopping);
        assert_eq!(harness.controller.remaining_seconds(), Some(0));

        events.extend(harness.controller.advance(Duration::from_secs(5)));
        let ticks = events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Tick { .. }))
            .count();
        assert_eq!(ticks, 45);
        assert_eq!(stopping(&events), 1);
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Stopping {
                reason: StopReason::Completed,
                ..
            }
        )));
        assert_eq!(ended(&events), 1);
        assert_eq!(harness.controller.state(), EngineState::Idle);
    }

    #[test]
    fn missing_haptics_degrades_to_audio_only() {
        let output = OfflineOutput::new(RATE, 1);
        let mut config = EngineConfig::default();
        config.audio.sample_rate = RATE;
        let mut controller = SessionController::new(config, output.clone(), NoHaptics).unwrap();

        controller.start(params(), 45).unwrap();
        assert_eq!(controller.state(), EngineState::Active);
        assert!(controller.haptic_pattern().is_none());
        assert_eq!(controller.live_oscillators(), 2);

        let events = controller.drain_events();
        assert!(matches!(
            events[0],
            SessionEvent::Started { haptics: None, .. }
        ));
    }

    #[test]
    fn teardown_releases_everything_immediately() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();
        harness.run_for(Duration::from_millis(500));

        let events = harness.controller.teardown();
        assert_eq!(ended(&events), 1);
        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert!(!harness.output.is_open());
        assert_eq!(
            harness.actuator.commands().last(),
            Some(&HapticCommand::Cancel)
        );
        assert!(harness.controller.advance(Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn dropping_an_active_controller_releases_the_output() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 45).unwrap();
        let output = harness.output.clone();
        drop(harness);
        assert!(!output.is_open());
    }

    #[test]
    fn end_to_end_sixty_second_session() {
        let mut harness = Harness::new();
        harness.controller.start(params(), 60).unwrap();

        assert_eq!(harness.controller.state(), EngineState::Active);
        assert_eq!(harness.controller.remaining_seconds(), Some(60));
        let pattern = harness.controller.haptic_pattern().unwrap();
        assert_eq!(pattern.period(), Duration::from_millis(221));
        let period = harness.controller.pulse_period().unwrap();
        assert!((period.as_secs_f64() - 0.2222).abs() < 1e-3);

        let (events, samples) = harness.run_for(Duration::from_secs(62));

        assert!(matches!(events[0], SessionEvent::Started { .. }));
        assert_eq!(ended(&events), 1);
        assert!(matches!(events.last(), Some(SessionEvent::Ended { .. })));
        assert_eq!(harness.controller.state(), EngineState::Idle);
        assert_eq!(harness.controller.live_oscillators(), 0);
        assert!(!harness.output.is_open());

        // Haptics pulse for the whole 60 s at ~4.5 Hz and then stop.
        let pulses = harness.actuator.pulses();
        assert!((270..=272).contains(&pulses), "pulses = {pulses}");

        // Steady section: carrier on pitch, modulation never falls silent.
        let rate = RATE as usize;
        let steady = &samples[5 * rate..55 * rate];
        let summary = SignalProbe::new(RATE).analyse(steady).unwrap();
        assert!((summary.peak_hz - 136.1).abs() < 1.0, "{summary:?}");
        assert!(summary.envelope_floor > 0.1, "{summary:?}");
        let modulation = summary.modulation_hz.expect("modulation should be detected");
        assert!((modulation - 4.5).abs() < 0.25, "{summary:?}");

        // Release has finished well before the tail.
        assert!(samples[61 * rate..].iter().all(|sample| *sample == 0.0));
    }
}

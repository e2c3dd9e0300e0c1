use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
#[cfg(feature = "device")]
use sensory_anchor_core::DeviceOutput;
use sensory_anchor_core::{
    AnchorError, EngineConfig, NoHaptics, OfflineOutput, SessionController, SessionEvent,
    SessionParameters, SignalProbe, TracingActuator,
};
use tracing_subscriber::EnvFilter;

/// Session lengths offered to the user.
const SESSION_DURATIONS: [u32; 3] = [45, 60, 90];
const DRIVER_STEP: Duration = Duration::from_millis(10);
const OPEN_ATTEMPTS: u32 = 3;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

fn main() -> sensory_anchor_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Session {
            tone,
            duration,
            json,
        } => run_session(config, tone.parameters(), duration, json),
        Commands::Probe {
            tone,
            seconds,
            json,
        } => run_probe(config, tone.parameters(), seconds, json),
    }
}

fn run_session(
    config: EngineConfig,
    parameters: SessionParameters,
    duration: u32,
    json: bool,
) -> sensory_anchor_core::Result<()> {
    tracing::info!(?parameters, duration, "starting session");

    #[cfg(feature = "device")]
    let (output, paced): (DeviceOutput, Option<OfflineOutput>) = (DeviceOutput::new(), None);
    #[cfg(not(feature = "device"))]
    let (output, paced) = {
        tracing::warn!("built without the `device` feature; rendering silently in real time");
        let output = OfflineOutput::new(config.audio.sample_rate, config.audio.channels);
        (output.clone(), Some(output))
    };

    let mut controller = SessionController::new(config, output, TracingActuator)?;
    start_with_retry(&mut controller, parameters, duration)?;

    let began = Instant::now();
    let mut last = began;
    let mut rendered = 0_u64;
    loop {
        thread::sleep(DRIVER_STEP);
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        if let Some(paced) = &paced {
            let target = (now - began).as_secs_f64() * f64::from(paced.sample_rate());
            let frames = (target as u64).saturating_sub(rendered);
            paced.render(frames as usize)?;
            rendered += frames;
        }

        for event in controller.advance(elapsed) {
            report(&event, json)?;
            if matches!(event, SessionEvent::Ended { .. }) {
                return Ok(());
            }
        }
    }
}

/// The output may refuse the first attempts (for example while the device is
/// being claimed by another client); give it a few chances before giving up.
fn start_with_retry(
    controller: &mut SessionController,
    parameters: SessionParameters,
    duration: u32,
) -> sensory_anchor_core::Result<()> {
    let mut attempt = 1;
    loop {
        match controller.start(parameters, duration) {
            Ok(outcome) => {
                tracing::debug!(?outcome, attempt, "session start accepted");
                return Ok(());
            }
            Err(err) if err.is_recoverable() && attempt < OPEN_ATTEMPTS => {
                tracing::warn!(%err, attempt, "audio output unavailable; retrying");
                thread::sleep(OPEN_RETRY_DELAY);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn report(event: &SessionEvent, json: bool) -> sensory_anchor_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        SessionEvent::Started {
            pulse_period_ms, ..
        } => println!("session started (pulse every {pulse_period_ms:.1} ms)"),
        SessionEvent::Tick {
            remaining_seconds, ..
        } => println!(
            "{:02}:{:02}",
            remaining_seconds / 60,
            remaining_seconds % 60
        ),
        SessionEvent::Stopping { reason, .. } => println!("winding down ({reason:?})"),
        SessionEvent::Ended { .. } => println!("session ended"),
    }
    Ok(())
}

/// Renders a whole session offline and reports what came out of the graph.
fn run_probe(
    config: EngineConfig,
    parameters: SessionParameters,
    seconds: u32,
    json: bool,
) -> sensory_anchor_core::Result<()> {
    tracing::info!(?parameters, seconds, "probing rendered session");

    let sample_rate = config.audio.sample_rate;
    let attack_seconds = config.envelope.attack_seconds;
    let output = OfflineOutput::new(sample_rate, 1);
    let mut controller = SessionController::new(config, output.clone(), NoHaptics)?;
    controller.start(parameters, seconds)?;

    let frames_per_step = (f64::from(sample_rate) * DRIVER_STEP.as_secs_f64()).round() as usize;
    let mut samples = Vec::new();
    let mut ended = false;
    while !ended {
        samples.extend(output.render(frames_per_step)?);
        ended = controller
            .advance(DRIVER_STEP)
            .iter()
            .any(|event| matches!(event, SessionEvent::Ended { .. }));
    }

    let sustain_from = (attack_seconds * f64::from(sample_rate)).ceil() as usize;
    let sustain_to = seconds as usize * sample_rate as usize;
    let sustained = samples
        .get(sustain_from..sustain_to)
        .filter(|block| block.len() >= 2)
        .ok_or_else(|| AnchorError::msg("probe is too short to reach the sustained section"))?;
    let summary = SignalProbe::new(sample_rate).analyse(sustained)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("carrier peak      {:8.2} Hz", summary.peak_hz);
        match summary.modulation_hz {
            Some(rate) => println!("modulation rate   {rate:8.2} Hz"),
            None => println!("modulation rate        n/a"),
        }
        println!("envelope floor    {:8.4}", summary.envelope_floor);
        println!("envelope ceiling  {:8.4}", summary.envelope_ceiling);
        println!("rms               {:8.4}", summary.rms);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_duration(value: &str) -> Result<u32, String> {
    let seconds: u32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number of seconds"))?;
    if SESSION_DURATIONS.contains(&seconds) {
        Ok(seconds)
    } else {
        Err(format!(
            "session duration must be one of {SESSION_DURATIONS:?} seconds"
        ))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Timed audio-haptic anchor sessions", long_about = None)]
struct Cli {
    /// Optional JSON file overriding engine constants.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a session in real time.
    Session {
        #[command(flatten)]
        tone: ToneArgs,
        /// Session length in seconds (45, 60 or 90).
        #[arg(short, long, default_value = "60", value_parser = parse_duration)]
        duration: u32,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Render a session offline and report carrier, modulation and envelope.
    Probe {
        #[command(flatten)]
        tone: ToneArgs,
        /// Session length to render, in seconds.
        #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u32).range(3..))]
        seconds: u32,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ToneArgs {
    /// Carrier tone frequency in Hz.
    #[arg(long)]
    sound_hz: f32,
    /// Pulse rate in Hz, shared by the amplitude modulation and the haptics.
    #[arg(long)]
    pulse_hz: f32,
    /// Nominal vibration frequency in Hz. Defaults to the pulse rate.
    #[arg(long)]
    vibration_hz: Option<f32>,
}

impl ToneArgs {
    fn parameters(&self) -> SessionParameters {
        SessionParameters::new(
            self.sound_hz,
            self.pulse_hz,
            self.vibration_hz.unwrap_or(self.pulse_hz),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_offered_durations() {
        assert_eq!(parse_duration("45"), Ok(45));
        assert_eq!(parse_duration("90"), Ok(90));
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("sixty").is_err());
    }

    #[test]
    fn vibration_defaults_to_pulse_rate() {
        let cli = Cli::try_parse_from([
            "sensory-anchor-app",
            "session",
            "--sound-hz",
            "136.1",
            "--pulse-hz",
            "4.5",
        ])
        .unwrap();
        let Commands::Session { tone, duration, .. } = cli.command else {
            panic!("expected session command");
        };
        assert_eq!(duration, 60);
        assert_eq!(tone.parameters(), SessionParameters::new(136.1, 4.5, 4.5));
    }

    #[test]
    fn rejects_unlisted_duration_at_parse_time() {
        let result = Cli::try_parse_from([
            "sensory-anchor-app",
            "session",
            "--sound-hz",
            "136.1",
            "--pulse-hz",
            "4.5",
            "--duration",
            "120",
        ]);
        assert!(result.is_err());
    }
}

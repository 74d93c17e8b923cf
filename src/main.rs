use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use stemdeck::audio::{
    AudioOutput, EngineState, FolderSource, LayerEngine, StemEngine, ToneSource, TrackSource,
    export_wav, wait_for_shared_load,
};
use stemdeck::replay::{ControlEvent, Frame, FrameScript};
use stemdeck::{Config, DjController, GestureState};

/// How long to wait for a track change still loading when the script ends.
const FINAL_LOAD_WAIT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "stemdeck", version, about = "Gesture-controlled stem mixer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log every gesture commit
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the mixer from a recorded frame script
    Replay {
        script: PathBuf,

        /// TOML config; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Play through the default output device in real time
        #[arg(long, conflicts_with = "render")]
        play: bool,

        /// Write the mix to a mono WAV file instead of playing it
        #[arg(long, value_name = "WAV")]
        render: Option<PathBuf>,
    },
    /// Validate a config file
    CheckConfig { config: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "stemdeck=debug" } else { "stemdeck=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Command::Replay {
            script,
            config,
            play,
            render,
        } => replay(&script, config.as_deref(), play, render.as_deref()),
        Command::CheckConfig { config } => {
            let loaded = Config::load(&config)?;
            println!(
                "{}: ok ({} tracks, {} stems per track, control hand {})",
                config.display(),
                loaded.audio.tracks.len(),
                loaded.gesture.stems_per_track,
                loaded.hand.control_hand
            );
            Ok(())
        }
    }
}

fn replay(script: &Path, config: Option<&Path>, play: bool, render: Option<&Path>) -> Result<()> {
    let mut config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let frames = FrameScript::load(script)?.frames();
    info!(frames = frames.len(), script = %script.display(), "Loaded frame script");

    // Decode stems at the device rate so the stream needs no resampling
    let output = if play {
        let output = AudioOutput::new()?;
        config.audio.sample_rate = output.sample_rate();
        info!(device = output.device_name(), "Playing live");
        Some(output)
    } else {
        None
    };

    let source: Arc<dyn TrackSource> = if config.audio.music_dir.is_dir() {
        Arc::new(FolderSource::new(&config.audio))
    } else {
        warn!(
            music_dir = %config.audio.music_dir.display(),
            "Music folder not found, using synthetic tones"
        );
        Arc::new(ToneSource::from_config(&config.audio))
    };

    let engine = StemEngine::new(config.audio.clone(), source)?;
    let mut controller = DjController::from_config(&config);

    let state = match output {
        Some(output) => replay_live(&frames, &mut controller, engine, &output)?,
        None => replay_headless(&frames, &mut controller, engine, render)?,
    };
    print_summary(&state);
    Ok(())
}

/// Pace frames by their timestamps while the stream pulls audio.
fn replay_live(
    frames: &[Frame],
    controller: &mut DjController,
    engine: StemEngine,
    output: &AudioOutput,
) -> Result<EngineState> {
    let engine = Arc::new(Mutex::new(engine));
    let _stream = output.start(Arc::clone(&engine))?;
    let start = Instant::now();

    for frame in frames {
        let due = start + Duration::from_millis(frame.t);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }

        let mut engine = lock(&engine)?;
        let state = controller.process_frame(&mut *engine, &frame.hands, frame.t);
        log_events(frame.t, &state);
    }

    if !wait_for_shared_load(&engine, FINAL_LOAD_WAIT)? {
        warn!("Track load still running at end of script");
    }
    Ok(lock(&engine)?.state())
}

/// Run as fast as possible, rendering the audio between frames.
fn replay_headless(
    frames: &[Frame],
    controller: &mut DjController,
    mut engine: StemEngine,
    render: Option<&Path>,
) -> Result<EngineState> {
    let sample_rate = engine.config().sample_rate;
    let block = engine.config().buffer_size;
    let mut mix = Vec::new();
    let mut buffer = vec![0.0f32; block];
    let mut rendered_ms = 0;

    for frame in frames {
        if render.is_some() {
            let samples = (frame.t - rendered_ms) as usize * sample_rate as usize / 1000;
            render_samples(&mut engine, &mut buffer, samples, &mut mix);
            rendered_ms = frame.t;
        }
        let state = controller.process_frame(&mut engine, &frame.hands, frame.t);
        log_events(frame.t, &state);
    }

    if !engine.wait_for_load(FINAL_LOAD_WAIT) {
        warn!("Track load still running at end of script");
    }

    if let Some(path) = render {
        export_wav(path, &mix, sample_rate)
            .with_context(|| format!("writing mix to {}", path.display()))?;
        info!(
            path = %path.display(),
            seconds = mix.len() as f32 / sample_rate as f32,
            "Wrote mix"
        );
    }
    Ok(engine.state())
}

fn render_samples(engine: &mut StemEngine, buffer: &mut [f32], mut remaining: usize, mix: &mut Vec<f32>) {
    while remaining > 0 {
        let n = remaining.min(buffer.len());
        engine.render(&mut buffer[..n]);
        mix.extend_from_slice(&buffer[..n]);
        remaining -= n;
    }
}

fn lock(engine: &Mutex<StemEngine>) -> Result<std::sync::MutexGuard<'_, StemEngine>> {
    engine
        .lock()
        .map_err(|_| anyhow::anyhow!("audio engine lock poisoned"))
}

fn log_events(t: u64, state: &GestureState) {
    for event in ControlEvent::from_state(state) {
        info!(t, "{event}");
    }
}

fn print_summary(state: &EngineState) {
    println!("track    {} ({})", state.track_name, state.track_index + 1);
    println!("playing  {}", state.is_playing);
    match state.selected_layer {
        Some(layer) => println!("selected stem {} at {:.2}", layer + 1, state.selected_gain()),
        None => println!("selected none"),
    }
    let gains: Vec<String> = state
        .layer_gains
        .iter()
        .zip(&state.available_layers)
        .map(|(gain, available)| if *available { format!("{gain:.2}") } else { "-".into() })
        .collect();
    println!("gains    [{}]", gains.join(", "));
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{debug, info};

use tickplay::decoder::open_media;
use tickplay::host::{OPTION_COLOR_SPACE, OPTION_TEMPORAL_INTERP};
use tickplay::utils::{format_position, Config};
use tickplay::{Button, FrameRef, Host, SessionBuilder};

/// tickplay - drive a playback session headlessly and report statistics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Config file to use instead of the system and user files
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(short = 'n', long, value_name = "TICKS")]
    max_ticks: Option<u64>,

    /// Pace ticks at the presentation rate instead of running flat out
    #[arg(short, long)]
    realtime: bool,

    /// Seek by this many seconds after the first tick
    #[arg(long, value_name = "SECONDS", allow_hyphen_values = true)]
    seek: Option<i64>,

    /// Disable temporal interpolation
    #[arg(long = "no-interp", action = ArgAction::SetFalse)]
    interpolation: bool,

    /// Colorspace override (auto, BT.709, BT.601, FCC, SMPTE240M)
    #[arg(long, value_name = "SPACE", default_value = "auto")]
    color_space: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Host that discards output and counts what it was given
#[derive(Default)]
struct HeadlessHost {
    options: HashMap<&'static str, String>,
    options_changed: bool,
    frames_shown: u64,
    frames_duped: u64,
    audio_frames: u64,
    shutdown: bool,
}

impl Host for HeadlessHost {
    fn video_refresh(&mut self, frame: FrameRef<'_>, _width: u32, _height: u32, _stride: usize) {
        match frame {
            FrameRef::Dupe => self.frames_duped += 1,
            FrameRef::Pixels(_) | FrameRef::Hardware => self.frames_shown += 1,
        }
    }

    fn audio_batch(&mut self, samples: &[i16]) -> usize {
        let frames = samples.len() / 2;
        self.audio_frames += frames as u64;
        frames
    }

    fn input_poll(&mut self) {}

    fn input_state(&mut self, _button: Button) -> bool {
        false
    }

    fn variables_updated(&mut self) -> bool {
        std::mem::take(&mut self.options_changed)
    }

    fn variable(&mut self, key: &str) -> Option<String> {
        self.options.get(key).cloned()
    }

    fn message(&mut self, text: &str, _frames: u32) {
        info!("{}", text);
    }

    fn request_shutdown(&mut self) {
        self.shutdown = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => tickplay::utils::load_config()?,
    };

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting tickplay v{}", env!("CARGO_PKG_VERSION"));

    let sources = open_media(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let mut session = SessionBuilder::new().with_config(config).open(sources)?;
    let events = session.events();
    let av_info = session.av_info();
    info!("{}", serde_json::to_string(&av_info)?);

    let mut host = HeadlessHost::default();
    host.options.insert(
        OPTION_TEMPORAL_INTERP,
        if args.interpolation { "enabled" } else { "disabled" }.to_string(),
    );
    host.options.insert(OPTION_COLOR_SPACE, args.color_space.clone());

    let interval = Duration::from_secs_f64(1.0 / av_info.fps);
    let started = Instant::now();
    let mut deadline = started;
    let mut ticks = 0u64;

    while !host.shutdown && args.max_ticks.map_or(true, |max| ticks < max) {
        session.run(&mut host)?;
        ticks += 1;

        if ticks == 1 {
            if let Some(seconds) = args.seek {
                session.seek(seconds);
            }
        }

        for event in events.try_iter() {
            debug!("{:?}", event);
        }

        if ticks % (av_info.fps as u64).max(1) == 0 {
            debug!("Position {}", format_position(session.position()));
        }

        if args.realtime {
            deadline += interval;
            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
    }

    info!(
        "Ran {} ticks in {:.2?}: {} frames shown, {} duplicated, {} audio frames",
        ticks,
        started.elapsed(),
        host.frames_shown,
        host.frames_duped,
        host.audio_frames
    );
    println!("{}", serde_json::to_string_pretty(&session.stats())?);

    Ok(())
}

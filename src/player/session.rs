//! Session construction and the per-tick entry point

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use crate::audio::{frames_to_bytes, PresentationClock, FALLBACK_SAMPLE_RATE};
use crate::decoder::{MediaSources, StreamSelection, VideoGeometry};
use crate::host::{Host, OPTION_COLOR_SPACE, OPTION_TEMPORAL_INTERP};
use crate::pipeline::consumer::Consumer;
use crate::pipeline::exchange::Exchange;
use crate::pipeline::producer::{self, VIDEO_HEADER_BYTES};
use crate::pipeline::ProducerState;
use crate::player::{InputAction, InputController, PlaybackState, PlaybackStats, SessionEvent};
use crate::renderer::{CpuPresenter, GpuPresenter, GpuRenderer, VideoOutput, FALLBACK_GEOMETRY};
use crate::utils::config::{ColorSpace, Config, RenderPath};
use crate::utils::error::Result;

/// Events buffered before new ones are dropped
const EVENT_CAPACITY: usize = 256;

/// Ticks a track switch message stays on screen
const MESSAGE_FRAMES: u32 = 180;

/// Timing and geometry reported to the host after open
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvInfo {
    /// Presentation ticks per second
    pub fps: f64,
    pub sample_rate: u32,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
}

impl AvInfo {
    fn new(fps: f64, sample_rate: Option<u32>, geometry: Option<VideoGeometry>) -> Self {
        let (width, height, aspect) = match geometry {
            Some(g) => (g.width, g.height, g.aspect),
            None => (FALLBACK_GEOMETRY.0, FALLBACK_GEOMETRY.1, 0.0),
        };

        let aspect_ratio = if aspect > 0.0 { aspect } else { width as f32 / height as f32 };

        Self {
            fps,
            sample_rate: sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE),
            width,
            height,
            aspect_ratio,
        }
    }
}

/// Builder for a [`PlayerSession`]
pub struct SessionBuilder {
    config: Config,
    gpu: Option<Box<dyn GpuRenderer>>,
}

impl SessionBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            gpu: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Provide a GPU renderer, used when the config asks for the GPU path
    pub fn with_gpu_renderer<R: GpuRenderer + 'static>(mut self, renderer: R) -> Self {
        self.gpu = Some(Box::new(renderer));
        self
    }

    /// Validate the sources, size the queues and start the decode thread
    ///
    /// On failure nothing is left running and every source is dropped.
    pub fn open(self, mut sources: MediaSources) -> Result<PlayerSession> {
        let config = self.config;
        config.validate()?;
        sources.resolve()?;
        debug!(
            "Streams: video {}, audio {}, subtitles {}",
            sources.has_video(),
            sources.has_audio(),
            sources.has_subtitles()
        );

        let pipeline = &config.pipeline;
        let geometry = sources.video_geometry();
        let sample_rate = sources.sample_rate();
        let selection = StreamSelection::new(sources.audio.len(), sources.subtitles.len());
        let color_space = config.video.color_space;

        let video_capacity = geometry.map_or(0, |g| (VIDEO_HEADER_BYTES + g.frame_bytes()) * pipeline.video_buffer_frames);
        let audio_capacity =
            frames_to_bytes((pipeline.audio_buffer_seconds * sample_rate.unwrap_or(0) as f64) as usize);
        debug!("Queue capacities: video {} bytes, audio {} bytes", video_capacity, audio_capacity);

        let output = match (geometry, config.video.render_path, self.gpu) {
            (None, _, _) => VideoOutput::Disabled,
            (Some(_), RenderPath::Gpu, Some(renderer)) => VideoOutput::Gpu(GpuPresenter::new(renderer)),
            (Some(g), path, _) => {
                if path == RenderPath::Gpu {
                    warn!("GPU render path requested without a renderer, blending on the CPU");
                }
                VideoOutput::Cpu(CpuPresenter::new(g.pixel_count()))
            }
        };

        let exchange = Arc::new(Exchange::new(
            video_capacity,
            audio_capacity,
            selection.audio.active(),
            selection.subtitle.active(),
            color_space,
        ));
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);

        let av_info = AvInfo::new(pipeline.interpolate_fps, sample_rate, geometry);
        let clock = PresentationClock::new(
            pipeline.interpolate_fps,
            sample_rate.unwrap_or(0),
            pipeline.discontinuity_threshold,
        );

        let decode_thread = producer::spawn(
            Arc::clone(&exchange),
            sources,
            pipeline.max_decode_attempts,
            color_space,
            events_tx.clone(),
        )?;

        info!(
            "Session opened: {}x{} @ {} ticks/s, {} Hz, {} audio / {} subtitle tracks, {:?} output",
            av_info.width,
            av_info.height,
            av_info.fps,
            av_info.sample_rate,
            selection.audio.count(),
            selection.subtitle.count(),
            output
        );

        let consumer = Consumer::new(
            Arc::clone(&exchange),
            events_tx.clone(),
            clock,
            output,
            geometry,
            config.video.temporal_interpolation,
        );

        Ok(PlayerSession {
            exchange,
            consumer,
            controller: InputController::new(&config.input),
            selection,
            color_space,
            options_read: false,
            av_info,
            events_tx,
            events_rx,
            decode_thread: Some(decode_thread),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One opened media being presented to a host
pub struct PlayerSession {
    exchange: Arc<Exchange>,
    consumer: Consumer,
    controller: InputController,
    selection: StreamSelection,
    color_space: ColorSpace,

    /// Host options are read on the first tick regardless of change notification
    options_read: bool,

    av_info: AvInfo,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    decode_thread: Option<JoinHandle<()>>,
}

impl PlayerSession {
    /// Open with default settings
    pub fn open(sources: MediaSources) -> Result<Self> {
        SessionBuilder::new().open(sources)
    }

    /// Present one tick: input, options, audio, video
    pub fn run(&mut self, host: &mut dyn Host) -> Result<()> {
        host.input_poll();

        if !self.options_read || host.variables_updated() {
            self.options_read = true;
            self.read_options(host);
        }

        for action in self.controller.poll(host) {
            match action {
                InputAction::Seek { seconds } => {
                    self.seek(seconds);
                }
                InputAction::CycleAudio => self.cycle_audio(host),
                InputAction::CycleSubtitle => self.cycle_subtitle(host),
            }
        }

        self.consumer.tick(host)
    }

    /// Seek relative to the current tick position
    ///
    /// Blocks until the decode thread has repositioned. Returns the new
    /// position in seconds, or `None` when decoding has already stopped.
    pub fn seek(&mut self, seconds: i64) -> Option<f64> {
        let ticks = (seconds as f64 * self.av_info.fps).round() as i64;
        info!("Seeking {:+}s ({:+} ticks)", seconds, ticks);
        self.consumer.seek_by(ticks)
    }

    fn read_options(&mut self, host: &mut dyn Host) {
        if let Some(value) = host.variable(OPTION_TEMPORAL_INTERP) {
            let enabled = value != "disabled";
            debug!("Temporal interpolation {}", if enabled { "enabled" } else { "disabled" });
            self.consumer.set_temporal_interpolation(enabled);
        }

        if let Some(value) = host.variable(OPTION_COLOR_SPACE) {
            match ColorSpace::from_option_value(&value) {
                Some(color_space) if color_space != self.color_space => {
                    info!("Colorspace set to {:?}", color_space);
                    self.color_space = color_space;
                    self.exchange.lock().color_space = color_space;
                    self.exchange.broadcast();
                }
                Some(_) => {}
                None => warn!("Ignoring unknown colorspace option '{}'", value),
            }
        }
    }

    fn cycle_audio(&mut self, host: &mut dyn Host) {
        let track = match self.selection.audio.cycle() {
            Some(track) => track,
            None => return,
        };

        info!("Switching to audio track {}", track);
        self.exchange.lock().active_audio = Some(track);
        self.exchange.broadcast();

        host.message(&format!("Audio Track #{}", track), MESSAGE_FRAMES);
        self.emit(SessionEvent::AudioTrackChanged { track });
    }

    fn cycle_subtitle(&mut self, host: &mut dyn Host) {
        let track = match self.selection.subtitle.cycle() {
            Some(track) => track,
            None => return,
        };

        info!("Switching to subtitle track {}", track);
        self.exchange.lock().active_subtitle = Some(track);
        self.exchange.broadcast();

        host.message(&format!("Subtitle Track #{}", track), MESSAGE_FRAMES);
        self.emit(SessionEvent::SubtitleTrackChanged { track });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events_tx.try_send(event).is_err() {
            trace!("Event channel full, dropping event");
        }
    }

    pub fn av_info(&self) -> AvInfo {
        self.av_info
    }

    /// Receiver for playback events; clones share one stream
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn stats(&self) -> PlaybackStats {
        let drops = self.exchange.lock().congestion_drops;
        self.consumer.stats.snapshot(drops)
    }

    pub fn state(&self) -> PlaybackState {
        self.consumer.stats.state()
    }

    pub fn producer_state(&self) -> ProducerState {
        self.exchange.producer_state()
    }

    /// Media time presented on the current tick
    pub fn position(&self) -> f64 {
        self.consumer.clock().min_pts()
    }

    pub fn selection(&self) -> StreamSelection {
        self.selection
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.exchange.request_shutdown();

        if let Some(handle) = self.decode_thread.take() {
            if handle.join().is_err() {
                error!("Decode thread panicked");
            }
        }
        debug!("Session closed");
    }
}

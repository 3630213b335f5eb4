//! Decode thread
//!
//! Pulls packets from the demuxer, routes them to the video decoder, the
//! active audio track or a subtitle track, and pushes timestamped records
//! into the exchange queues. Video records are an 8-byte little-endian
//! `f64` pts followed by width * height XRGB8888 pixels; audio records are
//! bare interleaved stereo S16 frames.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error, info, trace, warn};

use crate::audio::SampleScratch;
use crate::decoder::{AudioSource, Demuxer, MediaSources, Packet, SeekDirection, SubtitleSource, VideoSource};
use crate::pipeline::exchange::{Exchange, ProducerState, QueueKind};
use crate::player::SessionEvent;
use crate::renderer::{blend_overlay, SubtitleCompositor};
use crate::utils::config::ColorSpace;
use crate::internal_error;
use crate::utils::error::Result;

/// Bytes of pts in front of every video record
pub(crate) const VIDEO_HEADER_BYTES: usize = std::mem::size_of::<f64>();

/// Start the decode thread
pub(crate) fn spawn(
    exchange: Arc<Exchange>,
    sources: MediaSources,
    max_decode_attempts: u32,
    color_space: ColorSpace,
    events: Sender<SessionEvent>,
) -> Result<JoinHandle<()>> {
    let producer = Producer::new(Outlet { exchange, events }, sources, max_decode_attempts, color_space);

    thread::Builder::new()
        .name("tickplay-decode".to_string())
        .spawn(move || producer.run())
        .map_err(|e| internal_error!("Failed to spawn decode thread: {}", e))
}

/// How a queue write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Written,

    /// The record can never fit; dropped
    Oversized,

    /// A seek or shutdown arrived while waiting for space
    Abandoned,
}

/// The producer's side of the exchange
///
/// Dropping it marks the producer dead, so the consumer is released even
/// if the decode thread unwinds.
pub(crate) struct Outlet {
    exchange: Arc<Exchange>,
    events: Sender<SessionEvent>,
}

impl Outlet {
    pub(crate) fn new(exchange: Arc<Exchange>, events: Sender<SessionEvent>) -> Self {
        Self { exchange, events }
    }

    fn publish(&self, state: ProducerState) {
        let mut shared = self.exchange.lock();
        if shared.producer_state != state {
            trace!("Producer {:?} -> {:?}", shared.producer_state, state);
            shared.producer_state = state;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.try_send(event).is_err() {
            trace!("Session event dropped, receiver full or gone");
        }
    }

    /// Append one record to `kind`, waiting for space
    ///
    /// While the consumer is flagged blocked the target queue is cleared
    /// instead of waited on.
    pub(crate) fn write(&self, kind: QueueKind, header: &[u8], body: &[u8], timestamp: f64) -> WriteOutcome {
        let len = header.len() + body.len();
        let mut shared = self.exchange.lock();
        shared.producer_state = ProducerState::WriteQueue;

        if len > shared.queue(kind).capacity() {
            warn!(
                "Dropping {:?} record of {} bytes, queue holds {}",
                kind,
                len,
                shared.queue(kind).capacity()
            );
            return WriteOutcome::Oversized;
        }

        loop {
            if shared.shutdown || shared.seek.is_some() {
                return WriteOutcome::Abandoned;
            }

            if shared.queue(kind).write_available() >= len {
                break;
            }

            if shared.consumer_blocked {
                let queue = shared.queue_mut(kind);
                let dropped = queue.read_available();
                queue.clear();
                shared.congestion_drops += 1;
                warn!("Consumer blocked with {:?} queue full, dropped {} bytes", kind, dropped);
                self.emit(SessionEvent::CongestionDrop { queue: kind, bytes: dropped });
                self.exchange.broadcast();
                break;
            }

            self.exchange.wait_space(&mut shared);
        }

        let queue = shared.queue_mut(kind);
        queue.write(header);
        queue.write(body);

        match kind {
            QueueKind::Video => shared.last_video_time = timestamp,
            QueueKind::Audio => shared.last_audio_time = timestamp,
        }

        self.exchange.broadcast();
        WriteOutcome::Written
    }
}

impl Drop for Outlet {
    fn drop(&mut self) {
        let mut shared = self.exchange.lock();
        shared.producer_dead = true;
        shared.producer_state = ProducerState::Terminated;
        drop(shared);
        self.exchange.broadcast();
        debug!("Decode thread terminated");
    }
}

/// Decode state machine; owns every collaborator
struct Producer {
    demuxer: Box<dyn Demuxer>,
    video: Option<VideoSource>,
    audio: Vec<AudioSource>,
    subtitles: Vec<SubtitleSource>,
    compositor: Option<Box<dyn SubtitleCompositor>>,

    /// Conversion target for one video frame
    pixels: Vec<u32>,

    /// Resample target, grown on demand
    scratch: SampleScratch,

    max_attempts: u32,

    active_audio: Option<usize>,
    active_subtitle: Option<usize>,
    color_space: ColorSpace,

    /// Timestamp of the last frame decoded on any stream
    last_decoded: f64,

    /// Expected pts of the next frame, for frames without one
    video_clock: Option<f64>,
    audio_clock: Option<f64>,

    // Dropped last so collaborators are released before the consumer hears
    // the producer is gone.
    outlet: Outlet,
}

impl Producer {
    fn new(outlet: Outlet, sources: MediaSources, max_attempts: u32, color_space: ColorSpace) -> Self {
        let MediaSources { demuxer, mut video, audio, subtitles, compositor } = sources;

        let pixels = video.as_ref().map_or(0, |v| v.geometry.pixel_count());
        if let Some(video) = video.as_mut() {
            video.stage.set_color_space(color_space);
        }

        let (active_audio, active_subtitle) = {
            let shared = outlet.exchange.lock();
            (shared.active_audio, shared.active_subtitle)
        };

        Self {
            demuxer,
            video,
            audio,
            subtitles,
            compositor,
            pixels: vec![0; pixels],
            scratch: SampleScratch::new(),
            max_attempts,
            active_audio,
            active_subtitle,
            color_space,
            last_decoded: 0.0,
            video_clock: None,
            audio_clock: None,
            outlet,
        }
    }

    fn run(mut self) {
        info!("Decode thread started");

        loop {
            let (shutdown, seek, audio, subtitle, color_space) = {
                let shared = self.outlet.exchange.lock();
                (shared.shutdown, shared.seek, shared.active_audio, shared.active_subtitle, shared.color_space)
            };

            if shutdown {
                debug!("Decode thread asked to stop");
                break;
            }

            self.apply_selection(audio, subtitle, color_space);

            if let Some(target) = seek {
                self.seek(target);
                continue;
            }

            self.outlet.publish(ProducerState::ReadPacket);
            let packet = match self.demuxer.read_packet() {
                Some(packet) => packet,
                None => {
                    info!("End of stream reached");
                    self.outlet.emit(SessionEvent::EndOfStream);
                    break;
                }
            };

            self.route(&packet);
        }
    }

    /// Pick up track and colorspace changes made by the consumer
    fn apply_selection(&mut self, audio: Option<usize>, subtitle: Option<usize>, color_space: ColorSpace) {
        if audio != self.active_audio {
            if let Some(source) = audio.and_then(|track| self.audio.get_mut(track)) {
                source.stage.flush();
                info!("Decoding audio track {} (stream #{})", audio.unwrap_or(0), source.stream_index);
            }
            self.active_audio = audio;
            self.audio_clock = None;
        }

        if subtitle != self.active_subtitle {
            debug!("Compositing subtitle track {:?}", subtitle);
            self.active_subtitle = subtitle;
        }

        if color_space != self.color_space {
            if let Some(video) = self.video.as_mut() {
                video.stage.set_color_space(color_space);
            }
            debug!("Colorspace set to {:?}", color_space);
            self.color_space = color_space;
        }
    }

    fn route(&mut self, packet: &Packet) {
        let index = packet.stream_index;

        if self.video.as_ref().map_or(false, |v| v.stream_index == index) {
            self.decode_video(packet);
            return;
        }

        let active_audio = self
            .active_audio
            .filter(|&track| self.audio.get(track).map_or(false, |a| a.stream_index == index));
        if let Some(track) = active_audio {
            self.decode_audio(track, packet);
            return;
        }

        if let Some(track) = self.subtitles.iter().position(|s| s.stream_index == index) {
            self.decode_subtitle(track, packet);
            return;
        }

        trace!("Discarding packet for stream #{}", index);
    }

    fn decode_video(&mut self, packet: &Packet) {
        let video = match self.video.as_mut() {
            Some(video) => video,
            None => return,
        };

        self.outlet.publish(ProducerState::DecodeVideo);
        if !retry(self.max_attempts, "video", || video.stage.decode(packet)) {
            return;
        }

        let geometry = video.geometry;
        loop {
            let pts = match video.stage.convert_next(&mut self.pixels) {
                None => break,
                Some(Err(e)) => {
                    warn!("Video conversion failed: {}", e);
                    continue;
                }
                Some(Ok(pts)) => pts,
            };

            let seconds = match pts {
                Some(ts) => video.time_base.to_seconds(ts),
                None => self.video_clock.unwrap_or(self.last_decoded),
            };
            if geometry.fps > 0.0 {
                self.video_clock = Some(seconds + 1.0 / geometry.fps);
            }
            self.last_decoded = seconds;

            if let (Some(compositor), Some(track)) = (self.compositor.as_mut(), self.active_subtitle) {
                for image in compositor.render(track, (seconds * 1000.0) as i64) {
                    blend_overlay(&mut self.pixels, geometry.width, geometry.height, &image);
                }
            }

            let header = seconds.to_le_bytes();
            let body: &[u8] = bytemuck::cast_slice(&self.pixels);
            if self.outlet.write(QueueKind::Video, &header, body, seconds) == WriteOutcome::Abandoned {
                return;
            }
        }
    }

    fn decode_audio(&mut self, track: usize, packet: &Packet) {
        let source = match self.audio.get_mut(track) {
            Some(source) => source,
            None => return,
        };

        self.outlet.publish(ProducerState::DecodeAudio);
        if !retry(self.max_attempts, "audio", || source.stage.decode(packet)) {
            return;
        }

        loop {
            let (pts, frames) = match source.stage.resample_next(&mut self.scratch) {
                None => break,
                Some(Err(e)) => {
                    warn!("Audio resampling failed: {}", e);
                    continue;
                }
                Some(Ok(out)) => out,
            };

            if frames == 0 {
                continue;
            }

            let seconds = match pts {
                Some(ts) => source.time_base.to_seconds(ts),
                None => self.audio_clock.unwrap_or(self.last_decoded),
            };
            self.audio_clock = Some(seconds + frames as f64 / source.sample_rate as f64);
            self.last_decoded = seconds;

            let body: &[u8] = bytemuck::cast_slice(self.scratch.frames(frames));
            if self.outlet.write(QueueKind::Audio, &[], body, seconds) == WriteOutcome::Abandoned {
                return;
            }
        }
    }

    fn decode_subtitle(&mut self, track: usize, packet: &Packet) {
        let source = match self.subtitles.get_mut(track) {
            Some(source) => source,
            None => return,
        };

        self.outlet.publish(ProducerState::DecodeSubtitle);
        let mut events = Vec::new();
        let decoded = retry(self.max_attempts, "subtitle", || {
            events = source.decoder.decode(packet)?;
            Ok(())
        });

        if !decoded {
            return;
        }

        if let Some(compositor) = self.compositor.as_mut() {
            for event in &events {
                if let Err(e) = compositor.process(track, event) {
                    warn!("Subtitle track {} rejected event: {}", track, e);
                }
            }
        }
    }

    fn seek(&mut self, target: f64) {
        self.outlet.publish(ProducerState::Seeking);

        let direction = if target < self.last_decoded {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        };
        let hint = self.video.as_ref().map(|v| v.stream_index).or_else(|| {
            self.active_audio
                .and_then(|track| self.audio.get(track))
                .map(|a| a.stream_index)
        });

        info!("Seeking to {:.3}s ({:?})", target, direction);
        let seeked = match self.demuxer.seek(hint, target, direction) {
            Ok(()) => true,
            Err(e) => {
                error!("Seek to {:.3}s failed: {}", target, e);
                false
            }
        };

        if seeked {
            if let Some(video) = self.video.as_mut() {
                video.stage.flush();
            }
            for source in &mut self.audio {
                source.stage.flush();
            }
            for (track, source) in self.subtitles.iter_mut().enumerate() {
                source.decoder.flush();
                if let Some(compositor) = self.compositor.as_mut() {
                    compositor.flush(track);
                }
            }
            self.video_clock = None;
            self.audio_clock = None;
            self.last_decoded = target;
        }

        let mut shared = self.outlet.exchange.lock();
        shared.video.clear();
        shared.audio.clear();
        if seeked {
            shared.last_video_time = target;
            shared.last_audio_time = target;
        }
        shared.seek = None;
        shared.producer_state = ProducerState::Idle;
        drop(shared);
        self.outlet.exchange.broadcast();
    }
}

/// Run `decode` up to `attempts` times; false when every attempt failed
fn retry<F>(attempts: u32, what: &str, mut decode: F) -> bool
where
    F: FnMut() -> Result<()>,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match decode() {
            Ok(()) => return true,
            Err(e) if attempt < attempts => debug!("{} decode attempt {} failed: {}", what, attempt, e),
            Err(e) => warn!("Dropping {} packet after {} attempts: {}", what, attempts, e),
        }
    }
    false
}

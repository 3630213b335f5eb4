//! Per-tick presentation
//!
//! Each host tick drains the audio the fixed-rate clock says is due,
//! reconciles the clock against the decoded audio timestamps, advances the
//! frame slots until they bracket the presentation time and hands exactly
//! one frame to the host.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use log::{info, trace, warn};
use parking_lot::MutexGuard;

use crate::audio::{bytes_to_frames, frames_to_bytes, mix_factor, BiasUpdate, PresentationClock, CHANNELS};
use crate::decoder::VideoGeometry;
use crate::host::Host;
use crate::pipeline::exchange::{Exchange, Shared};
use crate::pipeline::producer::VIDEO_HEADER_BYTES;
use crate::player::{PlaybackState, SessionEvent, StatsTracker};
use crate::renderer::{FrameSlots, VideoOutput};
use crate::utils::error::Result;

/// The host-thread half of the pipeline
pub(crate) struct Consumer {
    exchange: Arc<Exchange>,
    events: Sender<SessionEvent>,
    clock: PresentationClock,
    slots: FrameSlots,
    output: VideoOutput,
    geometry: Option<VideoGeometry>,
    has_audio: bool,
    temporal_interpolation: bool,

    /// Drain buffer for one tick of audio
    samples: Vec<i16>,

    pub(crate) stats: StatsTracker,
    shutdown_requested: bool,
}

impl Consumer {
    pub(crate) fn new(
        exchange: Arc<Exchange>,
        events: Sender<SessionEvent>,
        clock: PresentationClock,
        output: VideoOutput,
        geometry: Option<VideoGeometry>,
        temporal_interpolation: bool,
    ) -> Self {
        let pixel_count = geometry.map_or(0, |g| g.pixel_count());
        let has_audio = clock.sample_rate() > 0;

        Self {
            exchange,
            events,
            clock,
            slots: FrameSlots::new(pixel_count),
            output,
            geometry,
            has_audio,
            temporal_interpolation,
            samples: Vec::new(),
            stats: StatsTracker::new(),
            shutdown_requested: false,
        }
    }

    pub(crate) fn clock(&self) -> &PresentationClock {
        &self.clock
    }

    pub(crate) fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    pub(crate) fn set_temporal_interpolation(&mut self, enabled: bool) {
        self.temporal_interpolation = enabled;
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.try_send(event) {
            trace!("Dropping session event {:?}", e.into_inner());
        }
    }

    /// Bytes of one video record, 0 without video
    fn record_bytes(&self) -> usize {
        self.geometry.map_or(0, |g| VIDEO_HEADER_BYTES + g.frame_bytes())
    }

    /// Run one presentation tick
    pub(crate) fn tick(&mut self, host: &mut dyn Host) -> Result<()> {
        let started = Instant::now();

        if self.has_audio {
            self.present_audio(host);
        }

        let mix = self.advance_video()?;
        let (width, height) = self.geometry.map_or((0, 0), |g| (g.width, g.height));
        self.output.present(host, &self.slots, mix, width, height)?;

        self.check_finished(host);
        self.clock.advance();
        self.stats.tick(started);
        Ok(())
    }

    fn present_audio(&mut self, host: &mut dyn Host) {
        let to_read = self.clock.frames_to_read();

        let mut shared = self.exchange.lock();
        let wanted = frames_to_bytes(to_read as usize).min(shared.audio.capacity());
        wait_for(&self.exchange, &mut shared, |s| s.audio.read_available() >= wanted);

        // Once the audio has run out for good the bias is frozen and the tick
        // clock alone carries presentation through the remaining video.
        let audio_exhausted = shared.producer_dead && shared.audio.is_empty();
        if !audio_exhausted {
            if let BiasUpdate::Discontinuity { previous, current } =
                self.clock.update_bias(shared.last_audio_time, shared.audio.read_available())
            {
                self.slots.reset_pts();
                self.stats.discontinuity();
                self.emit(SessionEvent::Discontinuity { previous_bias: previous, current_bias: current });
            }
        }

        let available = bytes_to_frames(shared.audio.read_available()) as u64;
        let mut frames = to_read;
        if frames > available {
            warn!(
                "Audio underrun! Expected to play {} frames, can only play {} frames",
                to_read, available
            );
            self.stats.underrun();
            self.emit(SessionEvent::Underrun { requested: to_read, available });
            frames = available;
        }

        let len = frames as usize * CHANNELS;
        if self.samples.len() < len {
            self.samples.resize(len, 0);
        }
        shared.audio.read(bytemuck::cast_slice_mut(&mut self.samples[..len]));
        drop(shared);
        self.exchange.broadcast();

        let mut written = 0;
        while written < len {
            let accepted = host.audio_batch(&self.samples[written..len]);
            if accepted == 0 {
                warn!("Host accepted no audio, dropping {} frames", (len - written) / CHANNELS);
                break;
            }
            written += accepted * CHANNELS;
        }

        self.stats.audio_delivered((written / CHANNELS) as u64);
        self.clock.consume_audio(to_read);
    }

    /// Refill the slots up to the presentation time; returns the mix factor
    fn advance_video(&mut self) -> Result<f64> {
        let geometry = match self.geometry {
            Some(geometry) => geometry,
            None => return Ok(1.0),
        };

        let record_bytes = self.record_bytes();
        let min_pts = self.clock.min_pts();
        let mut shared = self.exchange.lock();

        while min_pts > self.slots.next().pts {
            wait_for(&self.exchange, &mut shared, |s| s.video.read_available() >= record_bytes);
            if shared.video.read_available() < record_bytes {
                break;
            }

            self.slots.advance();

            let mut header = [0u8; VIDEO_HEADER_BYTES];
            shared.video.read(&mut header);
            let next = self.slots.next_mut();
            shared.video.read(bytemuck::cast_slice_mut(next.pixels_mut()));
            next.mark_filled(f64::from_le_bytes(header));
            self.exchange.broadcast();
            self.stats.video_uploaded();

            let (output, slots) = (&mut self.output, &self.slots);
            MutexGuard::unlocked(&mut shared, || output.upload(slots.next(), geometry.width, geometry.height))?;
        }
        drop(shared);

        if !self.temporal_interpolation {
            return Ok(1.0);
        }
        Ok(mix_factor(self.slots.previous().pts, self.slots.next().pts, min_pts))
    }

    /// Request host shutdown once decoding stopped and nothing usable is buffered
    fn check_finished(&mut self, host: &mut dyn Host) {
        if self.shutdown_requested {
            return;
        }

        let record_bytes = self.record_bytes();
        let drained = {
            let shared = self.exchange.lock();
            let video_drained = record_bytes == 0 || shared.video.read_available() < record_bytes;
            shared.producer_dead && video_drained && shared.audio.is_empty()
        };

        if drained {
            info!("Decoding finished and buffers drained, requesting shutdown");
            self.shutdown_requested = true;
            self.stats.ended();
            host.request_shutdown();
        }
    }

    /// Move the clock by `offset` ticks and run the seek handshake
    ///
    /// Blocks until the decode thread has repositioned or died. Returns the
    /// seek target, or `None` if decoding already stopped.
    pub(crate) fn seek_by(&mut self, offset: i64) -> Option<f64> {
        if self.exchange.lock().producer_dead {
            warn!("Ignoring seek, decoding has stopped");
            return None;
        }

        self.stats.set_state(PlaybackState::Seeking);
        let target = self.clock.seek_by(offset);
        self.slots.reset_pts();

        let mut shared = self.exchange.lock();
        shared.video.clear();
        shared.audio.clear();
        shared.seek = Some(target);
        self.exchange.broadcast();

        while shared.seek.is_some() && !shared.producer_dead {
            self.exchange.wait_data(&mut shared);
        }
        drop(shared);

        info!("Seek to {:.3}s complete", target);
        self.stats.seek_completed();
        self.stats.set_state(PlaybackState::Playing);
        self.emit(SessionEvent::SeekCompleted { position: target });
        Some(target)
    }
}

/// Wait until `ready` holds or nothing more can arrive
///
/// The consumer is flagged blocked for the duration so a producer stuck on
/// the other queue clears it instead of waiting.
fn wait_for<F>(exchange: &Exchange, shared: &mut MutexGuard<'_, Shared>, ready: F)
where
    F: Fn(&Shared) -> bool,
{
    if ready(shared) {
        return;
    }

    shared.consumer_blocked = true;
    while !ready(shared) && !shared.finished() {
        exchange.broadcast();
        exchange.wait_data(shared);
    }
    shared.consumer_blocked = false;
}

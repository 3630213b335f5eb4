//! Integration test utilities for tickplay
//!
//! Scripted stand-ins for the external collaborators (demuxer, decoders,
//! converters, compositor and host) so whole sessions can run against the
//! real decode thread without any media files.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tickplay::decoder::{
    AudioDecoder, AudioSource, DecodedFrame, Demuxer, MediaKind, MediaSources, Packet, PixelConverter,
    Resampler, SeekDirection, StreamDescriptor, SubtitleDecoder, SubtitleEvent, SubtitleSource, TimeBase,
    VideoDecoder, VideoGeometry, VideoSource,
};
use tickplay::host::OPTION_TEMPORAL_INTERP;
use tickplay::renderer::{OverlayImage, SubtitleCompositor};
use tickplay::{Button, FrameRef, Host, PlayerError, PlayerSession, Result};

pub const VIDEO_STREAM: usize = 0;
pub const FIRST_AUDIO_STREAM: usize = 1;
pub const SUBTITLE_STREAM_BASE: usize = 10;

pub const MEDIA_FPS: f64 = 30.0;
pub const SAMPLE_RATE: u32 = 48_000;
pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 2;

/// Audio frames carried by each audio packet, one video frame's worth
pub const FRAMES_PER_PACKET: usize = (SAMPLE_RATE as f64 / MEDIA_FPS) as usize;

/// Sample value written by audio track `track`
pub fn track_sample(track: usize) -> i16 {
    (track as i16 + 1) * 100
}

/// Everything the fakes were asked to do
#[derive(Debug, Default)]
pub struct Journal {
    pub seeks: Vec<(Option<usize>, f64, SeekDirection)>,
    pub video_flushes: usize,
    pub audio_flushes: Vec<usize>,
    pub processed: Vec<(usize, SubtitleEvent)>,
    pub rendered_tracks: Vec<usize>,
    pub compositor_flushes: Vec<usize>,
}

pub type SharedJournal = Arc<Mutex<Journal>>;

/// Description of the media a test plays
#[derive(Debug, Clone)]
pub struct MediaScript {
    frames: usize,
    video: bool,
    audio_tracks: usize,
    subtitle_tracks: usize,
    video_first: bool,
    failing_seeks: bool,
    pixel_step: u32,
}

impl MediaScript {
    /// Video plus one audio track lasting `seconds`
    pub fn new(seconds: f64) -> Self {
        Self {
            frames: (seconds * MEDIA_FPS) as usize,
            video: true,
            audio_tracks: 1,
            subtitle_tracks: 0,
            video_first: false,
            failing_seeks: false,
            pixel_step: 1,
        }
    }

    pub fn audio_tracks(mut self, tracks: usize) -> Self {
        self.audio_tracks = tracks;
        self
    }

    pub fn subtitle_tracks(mut self, tracks: usize) -> Self {
        self.subtitle_tracks = tracks;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.video = false;
        self
    }

    /// Store every video packet ahead of every audio packet
    pub fn video_first(mut self) -> Self {
        self.video_first = true;
        self
    }

    /// Paint frame `i` with `i * step` instead of `i`
    pub fn pixel_step(mut self, step: u32) -> Self {
        self.pixel_step = step;
        self
    }

    /// Make every demuxer seek fail
    pub fn failing_seeks(mut self) -> Self {
        self.failing_seeks = true;
        self
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        let mut streams = Vec::new();
        if self.video {
            streams.push(descriptor(VIDEO_STREAM, MediaKind::Video, TimeBase::new(1, MEDIA_FPS as i32)));
        }
        for track in 0..self.audio_tracks {
            streams.push(descriptor(FIRST_AUDIO_STREAM + track, MediaKind::Audio, TimeBase::new(1, SAMPLE_RATE as i32)));
        }
        for track in 0..self.subtitle_tracks {
            streams.push(descriptor(SUBTITLE_STREAM_BASE + track, MediaKind::Subtitle, TimeBase::new(1, 1000)));
        }
        streams
    }

    /// Packets in container order, each with its time in seconds
    fn packets(&self) -> Vec<(f64, Packet)> {
        let mut video = Vec::new();
        let mut rest = Vec::new();

        for i in 0..self.frames {
            let seconds = i as f64 / MEDIA_FPS;
            if self.video {
                video.push((seconds, packet(VIDEO_STREAM, i as i64, Vec::new())));
            }
            for track in 0..self.audio_tracks {
                let pts = (i * FRAMES_PER_PACKET) as i64;
                rest.push((seconds, packet(FIRST_AUDIO_STREAM + track, pts, vec![track as u8])));
            }
            if i % MEDIA_FPS as usize == 0 {
                for track in 0..self.subtitle_tracks {
                    let text = format!("track {} line {}", track, i);
                    let pts = (seconds * 1000.0) as i64;
                    rest.push((seconds, packet(SUBTITLE_STREAM_BASE + track, pts, text.into_bytes())));
                }
            }
        }

        if self.video_first {
            video.extend(rest);
            return video;
        }

        // Interleave by time, video first within a frame period
        let mut merged = Vec::with_capacity(video.len() + rest.len());
        let mut rest = rest.into_iter().peekable();
        for entry in video {
            while let Some(next) = rest.next_if(|(t, _)| *t < entry.0) {
                merged.push(next);
            }
            merged.push(entry);
        }
        merged.extend(rest);
        merged
    }

    /// Build the sources, with a recording compositor when there are subtitle tracks
    pub fn build(&self) -> (MediaSources, SharedJournal) {
        let journal = SharedJournal::default();
        let demuxer = ScriptedDemuxer {
            streams: self.streams(),
            packets: self.packets(),
            cursor: 0,
            failing_seeks: self.failing_seeks,
            journal: Arc::clone(&journal),
        };

        let mut sources = MediaSources::new(demuxer);

        if self.video {
            let geometry = VideoGeometry { width: WIDTH, height: HEIGHT, fps: MEDIA_FPS, aspect: 0.0 };
            sources = sources.with_video(VideoSource::new(
                VIDEO_STREAM,
                geometry,
                StampDecoder { journal: Arc::clone(&journal) },
                IndexPainter { step: self.pixel_step },
            ));
        }

        for track in 0..self.audio_tracks {
            sources = sources.with_audio_track(AudioSource::new(
                FIRST_AUDIO_STREAM + track,
                SAMPLE_RATE,
                ToneDecoder { track, journal: Arc::clone(&journal) },
                ToneResampler,
            ));
        }

        for track in 0..self.subtitle_tracks {
            sources = sources.with_subtitle_track(SubtitleSource::new(SUBTITLE_STREAM_BASE + track, TextDecoder));
        }
        if self.subtitle_tracks > 0 {
            sources = sources.with_compositor(RecordingCompositor { journal: Arc::clone(&journal) });
        }

        (sources, journal)
    }
}

fn descriptor(index: usize, kind: MediaKind, time_base: TimeBase) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind,
        codec: "scripted".to_string(),
        time_base,
        language: None,
    }
}

fn packet(stream_index: usize, pts: i64, data: Vec<u8>) -> Packet {
    Packet {
        stream_index,
        data,
        pts: Some(pts),
        dts: Some(pts),
        keyframe: true,
    }
}

/// Demuxer replaying a fixed packet list
pub struct ScriptedDemuxer {
    streams: Vec<StreamDescriptor>,
    packets: Vec<(f64, Packet)>,
    cursor: usize,
    failing_seeks: bool,
    journal: SharedJournal,
}

impl Demuxer for ScriptedDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Option<Packet> {
        let (_, packet) = self.packets.get(self.cursor)?;
        self.cursor += 1;
        Some(packet.clone())
    }

    fn seek(&mut self, stream_hint: Option<usize>, seconds: f64, direction: SeekDirection) -> Result<()> {
        self.journal.lock().seeks.push((stream_hint, seconds, direction));
        if self.failing_seeks {
            return Err(PlayerError::demuxer_error("scripted seek failure"));
        }

        // Every packet is a keyframe, so land on the first one at or after the target
        self.cursor = self
            .packets
            .iter()
            .position(|(t, _)| *t >= seconds - 1e-9)
            .unwrap_or(self.packets.len());
        Ok(())
    }
}

/// Decoded frame carrying its timestamp and a payload value
pub struct Stamp {
    pts: Option<i64>,
    value: i64,
}

impl DecodedFrame for Stamp {
    fn best_effort_timestamp(&self) -> Option<i64> {
        self.pts
    }
}

/// Video decoder yielding one frame per packet, valued by its pts
pub struct StampDecoder {
    journal: SharedJournal,
}

impl VideoDecoder for StampDecoder {
    type Frame = Stamp;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Stamp>> {
        Ok(vec![Stamp { pts: packet.pts, value: packet.pts.unwrap_or(0) }])
    }

    fn flush(&mut self) {
        self.journal.lock().video_flushes += 1;
    }
}

/// Paints every pixel with the frame index times `step`
pub struct IndexPainter {
    pub step: u32,
}

impl PixelConverter<Stamp> for IndexPainter {
    fn convert(&mut self, frame: &Stamp, dst: &mut [u32]) -> Result<()> {
        dst.fill(0xff00_0000 | ((frame.value as u32).wrapping_mul(self.step) & 0x00ff_ffff));
        Ok(())
    }
}

/// Audio decoder yielding one frame per packet
pub struct ToneDecoder {
    track: usize,
    journal: SharedJournal,
}

impl AudioDecoder for ToneDecoder {
    type Frame = Stamp;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Stamp>> {
        Ok(vec![Stamp { pts: packet.pts, value: self.track as i64 }])
    }

    fn flush(&mut self) {
        self.journal.lock().audio_flushes.push(self.track);
    }
}

/// Fills each packet's worth of samples with the track's marker value
pub struct ToneResampler;

impl Resampler<Stamp> for ToneResampler {
    fn output_frames(&self, _frame: &Stamp) -> usize {
        FRAMES_PER_PACKET
    }

    fn convert(&mut self, frame: &Stamp, dst: &mut [i16]) -> Result<usize> {
        let samples = FRAMES_PER_PACKET * 2;
        dst[..samples].fill(track_sample(frame.value as usize));
        Ok(FRAMES_PER_PACKET)
    }
}

/// Subtitle decoder turning packet bytes into one event
pub struct TextDecoder;

impl SubtitleDecoder for TextDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<SubtitleEvent>> {
        Ok(vec![SubtitleEvent {
            text: String::from_utf8_lossy(&packet.data).into_owned(),
            start_ms: packet.pts.unwrap_or(0),
            duration_ms: 1000,
        }])
    }

    fn flush(&mut self) {}
}

/// Compositor drawing one opaque white pixel at the origin
pub struct RecordingCompositor {
    journal: SharedJournal,
}

impl SubtitleCompositor for RecordingCompositor {
    fn process(&mut self, track: usize, event: &SubtitleEvent) -> Result<()> {
        self.journal.lock().processed.push((track, event.clone()));
        Ok(())
    }

    fn render(&mut self, track: usize, _time_ms: i64) -> Vec<OverlayImage> {
        let mut journal = self.journal.lock();
        if journal.rendered_tracks.last() != Some(&track) {
            journal.rendered_tracks.push(track);
        }

        vec![OverlayImage {
            width: 1,
            height: 1,
            stride: 1,
            bitmap: vec![255],
            color: 0xffff_ff00,
            dst_x: 0,
            dst_y: 0,
        }]
    }

    fn flush(&mut self, track: usize) {
        self.journal.lock().compositor_flushes.push(track);
    }
}

/// What the host received for one tick
#[derive(Debug, Clone, PartialEq)]
pub enum Presented {
    Pixels(Vec<u32>),
    Dupe { width: u32, height: u32 },
    Hardware,
}

impl Presented {
    /// Frame index painted into the last pixel, which overlays never touch
    pub fn frame_index(&self) -> Option<u32> {
        match self {
            Presented::Pixels(pixels) => pixels.last().map(|p| p & 0x00ff_ffff),
            _ => None,
        }
    }
}

/// Host recording everything it is handed
pub struct TestHost {
    pub frames: Vec<Presented>,
    pub samples: Vec<i16>,
    pub messages: Vec<String>,
    pub shutdown: bool,
    options: HashMap<String, String>,
    options_changed: bool,
    pressed: HashSet<Button>,
}

impl TestHost {
    /// Host with temporal interpolation turned off so frames stay identifiable
    pub fn new() -> Self {
        let mut options = HashMap::new();
        options.insert(OPTION_TEMPORAL_INTERP.to_string(), "disabled".to_string());

        Self {
            frames: Vec::new(),
            samples: Vec::new(),
            messages: Vec::new(),
            shutdown: false,
            options,
            options_changed: false,
            pressed: HashSet::new(),
        }
    }

    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
        self.options_changed = true;
    }

    pub fn press(&mut self, button: Button) {
        self.pressed.insert(button);
    }

    pub fn release_all(&mut self) {
        self.pressed.clear();
    }

    /// Frame indices of every presented pixel frame, in order
    pub fn frame_indices(&self) -> Vec<u32> {
        self.frames.iter().filter_map(Presented::frame_index).collect()
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for TestHost {
    fn video_refresh(&mut self, frame: FrameRef<'_>, width: u32, height: u32, _stride: usize) {
        let presented = match frame {
            FrameRef::Pixels(bytes) => Presented::Pixels(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            FrameRef::Dupe => Presented::Dupe { width, height },
            FrameRef::Hardware => Presented::Hardware,
        };
        self.frames.push(presented);
    }

    fn audio_batch(&mut self, samples: &[i16]) -> usize {
        self.samples.extend_from_slice(samples);
        samples.len() / 2
    }

    fn input_poll(&mut self) {}

    fn input_state(&mut self, button: Button) -> bool {
        self.pressed.contains(&button)
    }

    fn variables_updated(&mut self) -> bool {
        std::mem::take(&mut self.options_changed)
    }

    fn variable(&mut self, key: &str) -> Option<String> {
        self.options.get(key).cloned()
    }

    fn message(&mut self, text: &str, _frames: u32) {
        self.messages.push(text.to_string());
    }

    fn request_shutdown(&mut self) {
        self.shutdown = true;
    }
}

/// Tick until the session asks the host to stop; returns the ticks run
///
/// Panics after `max_ticks` so a stuck pipeline fails the test instead of
/// hanging it.
pub fn run_to_end(session: &mut PlayerSession, host: &mut TestHost, max_ticks: usize) -> usize {
    for tick in 0..max_ticks {
        if host.shutdown {
            return tick;
        }
        session.run(host).expect("tick failed");
    }
    panic!("session did not finish within {} ticks", max_ticks);
}

//! Media sources handed to a session at open time
//!
//! A [`MediaSources`] bundles the demuxer with one decode stage per usable
//! stream. Stream presence is data: no video, no audio or no subtitles are
//! all valid as long as something is decodable.

use log::{debug, info};

use crate::decoder::stage::{AudioPath, VideoPath};
use crate::decoder::{
    AudioDecoder, AudioStage, Demuxer, MediaKind, PixelConverter, Resampler, StreamDescriptor,
    SubtitleDecoder, TimeBase, VideoDecoder, VideoStage,
};
use crate::renderer::SubtitleCompositor;
use crate::utils::error::{PlayerError, Result};

/// Geometry and native rate of the video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,

    /// Native frame rate of the stream
    pub fps: f64,

    /// Display aspect ratio (0.0 means square pixels)
    pub aspect: f32,
}

impl VideoGeometry {
    /// Bytes in one converted XRGB8888 frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * std::mem::size_of::<u32>()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// The single video stream
pub struct VideoSource {
    pub(crate) stream_index: usize,
    pub(crate) geometry: VideoGeometry,
    pub(crate) time_base: TimeBase,
    pub(crate) stage: Box<dyn VideoStage>,
}

impl VideoSource {
    pub fn new<D, C>(stream_index: usize, geometry: VideoGeometry, decoder: D, converter: C) -> Self
    where
        D: VideoDecoder + 'static,
        C: PixelConverter<D::Frame> + 'static,
    {
        Self {
            stream_index,
            geometry,
            time_base: TimeBase::new(0, 1),
            stage: Box::new(VideoPath::new(decoder, converter)),
        }
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }
}

/// One selectable audio track
pub struct AudioSource {
    pub(crate) stream_index: usize,
    pub(crate) sample_rate: u32,
    pub(crate) time_base: TimeBase,
    pub(crate) stage: Box<dyn AudioStage>,
}

impl AudioSource {
    /// `sample_rate` is the rate the resampler outputs
    pub fn new<D, R>(stream_index: usize, sample_rate: u32, decoder: D, resampler: R) -> Self
    where
        D: AudioDecoder + 'static,
        R: Resampler<D::Frame> + 'static,
    {
        Self {
            stream_index,
            sample_rate,
            time_base: TimeBase::new(0, 1),
            stage: Box::new(AudioPath::new(decoder, resampler)),
        }
    }
}

/// One selectable subtitle track
pub struct SubtitleSource {
    pub(crate) stream_index: usize,
    pub(crate) decoder: Box<dyn SubtitleDecoder>,
}

impl SubtitleSource {
    pub fn new<D: SubtitleDecoder + 'static>(stream_index: usize, decoder: D) -> Self {
        Self { stream_index, decoder: Box::new(decoder) }
    }
}

/// Everything the decode thread needs to produce frames and samples
pub struct MediaSources {
    pub(crate) demuxer: Box<dyn Demuxer>,
    pub(crate) video: Option<VideoSource>,
    pub(crate) audio: Vec<AudioSource>,
    pub(crate) subtitles: Vec<SubtitleSource>,
    pub(crate) compositor: Option<Box<dyn SubtitleCompositor>>,
}

impl MediaSources {
    pub fn new<M: Demuxer + 'static>(demuxer: M) -> Self {
        Self {
            demuxer: Box::new(demuxer),
            video: None,
            audio: Vec::new(),
            subtitles: Vec::new(),
            compositor: None,
        }
    }

    pub fn with_video(mut self, video: VideoSource) -> Self {
        self.video = Some(video);
        self
    }

    /// Add an audio track; the first one added is active initially
    pub fn with_audio_track(mut self, audio: AudioSource) -> Self {
        self.audio.push(audio);
        self
    }

    /// Add a subtitle track; the first one added is active initially
    pub fn with_subtitle_track(mut self, subtitle: SubtitleSource) -> Self {
        self.subtitles.push(subtitle);
        self
    }

    pub fn with_compositor<S: SubtitleCompositor + 'static>(mut self, compositor: S) -> Self {
        self.compositor = Some(Box::new(compositor));
        self
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    pub fn has_subtitles(&self) -> bool {
        !self.subtitles.is_empty()
    }

    /// Output sample rate shared by every audio track
    pub fn sample_rate(&self) -> Option<u32> {
        self.audio.first().map(|a| a.sample_rate)
    }

    pub fn video_geometry(&self) -> Option<VideoGeometry> {
        self.video.as_ref().map(|v| v.geometry)
    }

    /// Check stream indices against the demuxer and resolve time bases
    pub(crate) fn resolve(&mut self) -> Result<()> {
        if self.video.is_none() && self.audio.is_empty() {
            return Err(PlayerError::UnsupportedFormat("no decodable audio or video stream".to_string()));
        }

        let streams = self.demuxer.streams().to_vec();

        if let Some(video) = self.video.as_mut() {
            let desc = find_stream(&streams, video.stream_index, MediaKind::Video)?;
            if video.geometry.width == 0 || video.geometry.height == 0 {
                return Err(PlayerError::InvalidInput("video stream has zero size".to_string()));
            }
            video.time_base = desc.time_base;
            info!(
                "Video stream #{}: {} {}x{} @ {:.3} fps",
                desc.index, desc.codec, video.geometry.width, video.geometry.height, video.geometry.fps
            );
        }

        let sample_rate = self.sample_rate();
        for audio in &mut self.audio {
            let desc = find_stream(&streams, audio.stream_index, MediaKind::Audio)?;
            if audio.sample_rate == 0 || Some(audio.sample_rate) != sample_rate {
                return Err(PlayerError::UnsupportedFormat(format!(
                    "audio stream #{} resamples to {} Hz, session rate is {:?}",
                    desc.index, audio.sample_rate, sample_rate
                )));
            }
            audio.time_base = desc.time_base;
            info!("Audio stream #{}: {} {} Hz {:?}", desc.index, desc.codec, audio.sample_rate, desc.language);
        }

        for subtitle in &self.subtitles {
            let desc = find_stream(&streams, subtitle.stream_index, MediaKind::Subtitle)?;
            debug!("Subtitle stream #{}: {} {:?}", desc.index, desc.codec, desc.language);
        }

        Ok(())
    }
}

fn find_stream(streams: &[StreamDescriptor], index: usize, kind: MediaKind) -> Result<&StreamDescriptor> {
    let desc = streams
        .iter()
        .find(|s| s.index == index)
        .ok_or_else(|| PlayerError::InvalidInput(format!("stream #{} not found in container", index)))?;

    if desc.kind != kind {
        return Err(PlayerError::InvalidInput(format!(
            "stream #{} is {:?}, expected {:?}",
            index, desc.kind, kind
        )));
    }

    Ok(desc)
}

//! FFmpeg-based decoder implementation for tickplay
//!
//! Wraps the ffmpeg-next crate behind the demuxer, decoder, converter and
//! resampler contracts. Video is scaled to BGRA (XRGB8888 in memory on
//! little-endian hosts) at the stream's size and audio is resampled to
//! packed S16 stereo at the first audio track's rate.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media, software};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use crate::audio::{BYTES_PER_FRAME, CHANNELS};
use crate::decoder::{
    AudioDecoder, AudioSource, DecodedFrame, Demuxer, MediaKind, MediaSources, Packet, PixelConverter,
    Resampler, SeekDirection, StreamDescriptor, SubtitleDecoder, SubtitleEvent, SubtitleSource, TimeBase,
    VideoDecoder, VideoGeometry, VideoSource,
};
use crate::utils::config::ColorSpace;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};

/// Initialize FFmpeg once per process
fn init_ffmpeg() -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();

    INIT.get_or_try_init(|| {
        ffmpeg::init()?;
        ffmpeg::log::set_level(ffmpeg::log::Level::Warning);
        debug!("FFmpeg initialized");
        Ok::<(), PlayerError>(())
    })?;
    Ok(())
}

/// Open `path` and build sources for every stream the pipeline can use
///
/// The best video stream, every audio stream and every subtitle stream get
/// a decoder. No compositor is attached; callers that render subtitles add
/// one with [`MediaSources::with_compositor`].
pub fn open_media(path: &Path) -> Result<MediaSources> {
    init_ffmpeg()?;

    let demuxer = FfmpegDemuxer::open(path)?;
    let best_video = demuxer.input.streams().best(media::Type::Video).map(|s| s.index());

    let mut video = None;
    let mut audio = Vec::new();
    let mut subtitles = Vec::new();
    let mut sample_rate = None;

    for stream in demuxer.input.streams() {
        let index = stream.index();
        match stream.parameters().medium() {
            media::Type::Video if Some(index) == best_video => {
                let decoder = open_context(&stream)?.decoder().video()?;
                let geometry = VideoGeometry {
                    width: decoder.width(),
                    height: decoder.height(),
                    fps: f64::from(stream.avg_frame_rate()),
                    aspect: display_aspect(decoder.width(), decoder.height(), decoder.aspect_ratio()),
                };
                let converter = SwsConverter::new(geometry.width, geometry.height);
                video = Some(VideoSource::new(index, geometry, FfmpegVideoDecoder { decoder }, converter));
            }
            media::Type::Audio => {
                let decoder = open_context(&stream)?.decoder().audio()?;
                let rate = *sample_rate.get_or_insert(decoder.rate());
                audio.push(AudioSource::new(index, rate, FfmpegAudioDecoder { decoder }, SwrResampler::new(rate)));
            }
            media::Type::Subtitle => {
                let decoder = open_context(&stream)?.decoder().subtitle()?;
                let time_base = stream.time_base();
                subtitles.push(SubtitleSource::new(
                    index,
                    FfmpegSubtitleDecoder {
                        decoder,
                        time_base: TimeBase::new(time_base.numerator(), time_base.denominator()),
                    },
                ));
            }
            _ => {}
        }
    }

    info!(
        "Opened {}: video={}, {} audio, {} subtitle streams",
        path.display(),
        video.is_some(),
        audio.len(),
        subtitles.len()
    );

    let mut sources = MediaSources::new(demuxer);
    if let Some(video) = video {
        sources = sources.with_video(video);
    }
    for track in audio {
        sources = sources.with_audio_track(track);
    }
    for track in subtitles {
        sources = sources.with_subtitle_track(track);
    }
    Ok(sources)
}

fn open_context(stream: &format::stream::Stream) -> Result<codec::context::Context> {
    let mut context = codec::context::Context::from_parameters(stream.parameters())?;
    context.set_threading(codec::threading::Config {
        kind: codec::threading::Type::Frame,
        ..Default::default()
    });
    Ok(context)
}

/// Display aspect from the sample aspect ratio, 0.0 when unknown
fn display_aspect(width: u32, height: u32, sar: ffmpeg::Rational) -> f32 {
    if height == 0 || sar.numerator() <= 0 || sar.denominator() <= 0 {
        return 0.0;
    }
    (width as f64 * f64::from(sar) / height as f64) as f32
}

fn to_ffmpeg_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut out = ffmpeg::Packet::copy(&packet.data);
    out.set_stream(packet.stream_index);
    out.set_pts(packet.pts);
    out.set_dts(packet.dts);
    if packet.keyframe {
        out.set_flags(codec::packet::Flags::KEY);
    }
    out
}

/// Container reader over `format::context::Input`
pub struct FfmpegDemuxer {
    input: format::context::Input,
    streams: Vec<StreamDescriptor>,
}

// SAFETY: the input context is owned by the decode thread after open and
// never touched from another thread.
unsafe impl Send for FfmpegDemuxer {}

impl FfmpegDemuxer {
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let input = format::input(&path).demuxer_err(&format!("Failed to open {}", path.display()))?;
        let streams = input.streams().map(|s| describe(&s)).collect();
        Ok(Self { input, streams })
    }
}

fn describe(stream: &format::stream::Stream) -> StreamDescriptor {
    let parameters = stream.parameters();
    let kind = match parameters.medium() {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        _ => MediaKind::Other,
    };
    let time_base = stream.time_base();

    StreamDescriptor {
        index: stream.index(),
        kind,
        codec: parameters.id().name().to_string(),
        time_base: TimeBase::new(time_base.numerator(), time_base.denominator()),
        language: stream.metadata().get("language").map(str::to_string),
    }
}

impl Demuxer for FfmpegDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Option<Packet> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Some(Packet {
                stream_index: packet.stream(),
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                pts: packet.pts(),
                dts: packet.dts(),
                keyframe: packet.is_key(),
            }),
            Err(ffmpeg::Error::Eof) => None,
            Err(e) => {
                warn!("Stopping on read error: {}", e);
                None
            }
        }
    }

    fn seek(&mut self, stream_hint: Option<usize>, seconds: f64, direction: SeekDirection) -> Result<()> {
        let ts = TimeBase::new(1, ffmpeg::ffi::AV_TIME_BASE as i32).from_seconds(seconds);
        debug!("Seeking to {} (hint stream {:?}, {:?})", ts, stream_hint, direction);

        let result = match direction {
            SeekDirection::Backward => self.input.seek(ts, ..ts),
            SeekDirection::Forward => self.input.seek(ts, ts..),
        };
        result.demuxer_err(&format!("Seek to {:.3}s failed", seconds))
    }
}

impl DecodedFrame for ffmpeg::frame::Video {
    fn best_effort_timestamp(&self) -> Option<i64> {
        self.timestamp()
    }
}

impl DecodedFrame for ffmpeg::frame::Audio {
    fn best_effort_timestamp(&self) -> Option<i64> {
        self.timestamp()
    }
}

/// Drain every frame the decoder has ready
macro_rules! receive_all {
    ($decoder:expr, $frame:ty) => {{
        let mut frames = Vec::new();
        loop {
            let mut frame = <$frame>::empty();
            match $decoder.receive_frame(&mut frame) {
                Ok(()) => frames.push(frame),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        frames
    }};
}

pub struct FfmpegVideoDecoder {
    decoder: ffmpeg::decoder::Video,
}

// SAFETY: used only by the decode thread.
unsafe impl Send for FfmpegVideoDecoder {}

impl VideoDecoder for FfmpegVideoDecoder {
    type Frame = ffmpeg::frame::Video;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Self::Frame>> {
        self.decoder.send_packet(&to_ffmpeg_packet(packet))?;
        Ok(receive_all!(self.decoder, ffmpeg::frame::Video))
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

pub struct FfmpegAudioDecoder {
    decoder: ffmpeg::decoder::Audio,
}

// SAFETY: used only by the decode thread.
unsafe impl Send for FfmpegAudioDecoder {}

impl AudioDecoder for FfmpegAudioDecoder {
    type Frame = ffmpeg::frame::Audio;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Self::Frame>> {
        self.decoder.send_packet(&to_ffmpeg_packet(packet))?;
        Ok(receive_all!(self.decoder, ffmpeg::frame::Audio))
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

pub struct FfmpegSubtitleDecoder {
    decoder: ffmpeg::decoder::Subtitle,
    time_base: TimeBase,
}

// SAFETY: used only by the decode thread.
unsafe impl Send for FfmpegSubtitleDecoder {}

impl SubtitleDecoder for FfmpegSubtitleDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<SubtitleEvent>> {
        let mut subtitle = ffmpeg::Subtitle::new();
        if !self.decoder.decode(&to_ffmpeg_packet(packet), &mut subtitle)? {
            return Ok(Vec::new());
        }

        let base_ms = packet.pts.map_or(0, |pts| (self.time_base.to_seconds(pts) * 1000.0) as i64);
        let start_ms = base_ms + i64::from(subtitle.start());
        let duration_ms = i64::from(subtitle.end().saturating_sub(subtitle.start()));

        let events = subtitle
            .rects()
            .filter_map(|rect| match rect {
                ffmpeg::subtitle::Rect::Ass(ass) => Some(ass.get().to_string()),
                ffmpeg::subtitle::Rect::Text(text) => Some(text.get().to_string()),
                _ => None,
            })
            .map(|text| SubtitleEvent { text, start_ms, duration_ms })
            .collect();
        Ok(events)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

/// swscale conversion to the output pixel layout
pub struct SwsConverter {
    context: Option<software::scaling::Context>,
    width: u32,
    height: u32,
    color_space: ColorSpace,
    scaled: ffmpeg::frame::Video,
}

// SAFETY: used only by the decode thread.
unsafe impl Send for SwsConverter {}

impl SwsConverter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: None,
            width,
            height,
            color_space: ColorSpace::Auto,
            scaled: ffmpeg::frame::Video::empty(),
        }
    }

    fn ensure_context(&mut self, frame: &ffmpeg::frame::Video) -> Result<&mut software::scaling::Context> {
        let stale = match &self.context {
            None => true,
            Some(context) => {
                let input = context.input();
                input.format != frame.format() || input.width != frame.width() || input.height != frame.height()
            }
        };

        if stale {
            let mut context = software::scaling::Context::get(
                frame.format(),
                frame.width(),
                frame.height(),
                format::Pixel::BGRA,
                self.width,
                self.height,
                software::scaling::Flags::POINT,
            )?;
            apply_color_space(&mut context, self.color_space);
            self.context = Some(context);
        }

        self.context.as_mut().ok_or_else(|| PlayerError::decoder_error("Scaler unavailable"))
    }
}

/// Push colorspace coefficients into a scaling context
fn apply_color_space(context: &mut software::scaling::Context, color_space: ColorSpace) {
    let cs = match color_space {
        ColorSpace::Auto => return,
        ColorSpace::Bt709 => ffmpeg::ffi::SWS_CS_ITU709,
        ColorSpace::Bt601 => ffmpeg::ffi::SWS_CS_ITU601,
        ColorSpace::Fcc => ffmpeg::ffi::SWS_CS_FCC,
        ColorSpace::Smpte240m => ffmpeg::ffi::SWS_CS_SMPTE240M,
    };

    // SAFETY: the context pointer is valid for the lifetime of `context` and
    // the coefficient tables are static.
    let result = unsafe {
        let coefficients = ffmpeg::ffi::sws_getCoefficients(cs as i32);
        ffmpeg::ffi::sws_setColorspaceDetails(context.as_mut_ptr(), coefficients, 0, coefficients, 0, 0, 1 << 16, 1 << 16)
    };
    if result < 0 {
        warn!("Scaler rejected colorspace {:?}", color_space);
    }
}

impl PixelConverter<ffmpeg::frame::Video> for SwsConverter {
    fn convert(&mut self, frame: &ffmpeg::frame::Video, dst: &mut [u32]) -> Result<()> {
        let (width, height) = (self.width as usize, self.height as usize);
        let mut scaled = std::mem::replace(&mut self.scaled, ffmpeg::frame::Video::empty());
        self.ensure_context(frame)?.run(frame, &mut scaled)?;

        let row_bytes = width * std::mem::size_of::<u32>();
        let stride = scaled.stride(0);
        let src = scaled.data(0);
        let out: &mut [u8] = bytemuck::cast_slice_mut(dst);
        for (y, row) in out.chunks_exact_mut(row_bytes).take(height).enumerate() {
            let start = y * stride;
            row.copy_from_slice(&src[start..start + row_bytes]);
        }

        self.scaled = scaled;
        Ok(())
    }

    fn set_color_space(&mut self, color_space: ColorSpace) {
        self.color_space = color_space;
        if let Some(context) = self.context.as_mut() {
            apply_color_space(context, color_space);
        }
    }
}

/// swresample conversion to packed S16 stereo
pub struct SwrResampler {
    context: Option<software::resampling::Context>,
    rate: u32,
    resampled: ffmpeg::frame::Audio,
}

// SAFETY: used only by the decode thread.
unsafe impl Send for SwrResampler {}

impl SwrResampler {
    pub fn new(rate: u32) -> Self {
        Self {
            context: None,
            rate,
            resampled: ffmpeg::frame::Audio::empty(),
        }
    }

    fn ensure_context(&mut self, frame: &ffmpeg::frame::Audio) -> Result<&mut software::resampling::Context> {
        let stale = match &self.context {
            None => true,
            Some(context) => {
                let input = context.input();
                input.format != frame.format()
                    || input.rate != frame.rate()
                    || input.channel_layout != frame.channel_layout()
            }
        };

        if stale {
            self.context = Some(software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                format::Sample::I16(format::sample::Type::Packed),
                ffmpeg::ChannelLayout::STEREO,
                self.rate,
            )?);
        }

        self.context.as_mut().ok_or_else(|| PlayerError::decoder_error("Resampler unavailable"))
    }
}

impl Resampler<ffmpeg::frame::Audio> for SwrResampler {
    fn output_frames(&self, frame: &ffmpeg::frame::Audio) -> usize {
        let rate = frame.rate().max(1) as u64;
        // Rate conversion may carry up to a frame of delay
        ((frame.samples() as u64 * self.rate as u64).div_ceil(rate) as usize) + 32
    }

    fn convert(&mut self, frame: &ffmpeg::frame::Audio, dst: &mut [i16]) -> Result<usize> {
        let mut resampled = std::mem::replace(&mut self.resampled, ffmpeg::frame::Audio::empty());
        self.ensure_context(frame)?.run(frame, &mut resampled)?;

        let frames = resampled.samples().min(dst.len() / CHANNELS);
        let bytes = frames * BYTES_PER_FRAME;
        let out: &mut [u8] = bytemuck::cast_slice_mut(&mut dst[..frames * CHANNELS]);
        out.copy_from_slice(&resampled.data(0)[..bytes]);

        self.resampled = resampled;
        Ok(frames)
    }
}

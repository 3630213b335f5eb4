//! Type-erased decode stages
//!
//! A stage pairs a decoder with its converter so the decode thread can hold
//! `Box<dyn VideoStage>` / `Box<dyn AudioStage>` without knowing the
//! backend's frame types.

use std::collections::VecDeque;

use crate::audio::SampleScratch;
use crate::decoder::{AudioDecoder, DecodedFrame, Packet, PixelConverter, Resampler, VideoDecoder};
use crate::utils::config::ColorSpace;
use crate::utils::error::Result;

/// Video decoder + pixel converter
pub trait VideoStage: Send {
    /// Decode a packet, queueing any frames it yields
    fn decode(&mut self, packet: &Packet) -> Result<()>;

    /// Convert the oldest queued frame into `dst`
    ///
    /// Returns `None` when nothing is queued, otherwise the conversion
    /// result carrying the frame's best-effort timestamp.
    fn convert_next(&mut self, dst: &mut [u32]) -> Option<Result<Option<i64>>>;

    /// Drop queued frames and decoder state
    fn flush(&mut self);

    fn set_color_space(&mut self, color_space: ColorSpace);
}

/// Audio decoder + resampler
pub trait AudioStage: Send {
    /// Decode a packet, queueing any frames it yields
    fn decode(&mut self, packet: &Packet) -> Result<()>;

    /// Resample the oldest queued frame into `scratch`
    ///
    /// Returns the best-effort timestamp and the number of stereo frames
    /// now at the front of `scratch`.
    fn resample_next(&mut self, scratch: &mut SampleScratch) -> Option<Result<(Option<i64>, usize)>>;

    /// Drop queued frames and decoder state
    fn flush(&mut self);
}

pub(crate) struct VideoPath<D: VideoDecoder, C> {
    decoder: D,
    converter: C,
    pending: VecDeque<D::Frame>,
}

impl<D, C> VideoPath<D, C>
where
    D: VideoDecoder,
    C: PixelConverter<D::Frame>,
{
    pub(crate) fn new(decoder: D, converter: C) -> Self {
        Self { decoder, converter, pending: VecDeque::new() }
    }
}

impl<D, C> VideoStage for VideoPath<D, C>
where
    D: VideoDecoder,
    C: PixelConverter<D::Frame>,
{
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        let frames = self.decoder.decode(packet)?;
        self.pending.extend(frames);
        Ok(())
    }

    fn convert_next(&mut self, dst: &mut [u32]) -> Option<Result<Option<i64>>> {
        let frame = self.pending.pop_front()?;
        let pts = frame.best_effort_timestamp();
        Some(self.converter.convert(&frame, dst).map(|_| pts))
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.decoder.flush();
    }

    fn set_color_space(&mut self, color_space: ColorSpace) {
        self.converter.set_color_space(color_space);
    }
}

pub(crate) struct AudioPath<D: AudioDecoder, R> {
    decoder: D,
    resampler: R,
    pending: VecDeque<D::Frame>,
}

impl<D, R> AudioPath<D, R>
where
    D: AudioDecoder,
    R: Resampler<D::Frame>,
{
    pub(crate) fn new(decoder: D, resampler: R) -> Self {
        Self { decoder, resampler, pending: VecDeque::new() }
    }
}

impl<D, R> AudioStage for AudioPath<D, R>
where
    D: AudioDecoder,
    R: Resampler<D::Frame>,
{
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        let frames = self.decoder.decode(packet)?;
        self.pending.extend(frames);
        Ok(())
    }

    fn resample_next(&mut self, scratch: &mut SampleScratch) -> Option<Result<(Option<i64>, usize)>> {
        let frame = self.pending.pop_front()?;
        let pts = frame.best_effort_timestamp();
        let samples = scratch.reserve_frames(self.resampler.output_frames(&frame));
        Some(self.resampler.convert(&frame, samples).map(|frames| (pts, frames)))
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.decoder.flush();
    }
}

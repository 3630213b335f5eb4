//! Video output for tickplay
//!
//! Converted frames reach the host one of three ways: not at all (audio-only
//! media), as a CPU-blended XRGB8888 buffer, or through an external GPU
//! renderer that owns two textures and blends them itself.

mod frame;
mod overlay;

pub use frame::{blend_temporal, FrameSlot, FrameSlots};
pub use overlay::{blend_overlay, OverlayImage, SubtitleCompositor};

use crate::host::Host;
use crate::utils::error::Result;

/// Width and height reported when there is no video stream
pub const FALLBACK_GEOMETRY: (u32, u32) = (320, 240);

/// What the host is given for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRef<'a> {
    /// XRGB8888 bytes, `height` rows of `stride` bytes
    Pixels(&'a [u8]),

    /// Show the previous frame again
    Dupe,

    /// The GPU renderer already drew the frame into the host's framebuffer
    Hardware,
}

/// External GPU renderer blending two uploaded textures
pub trait GpuRenderer: Send {
    /// Upload XRGB8888 pixels into texture `texture`
    fn upload(&mut self, texture: usize, pixels: &[u32], width: u32, height: u32) -> Result<()>;

    /// Draw `previous` cross-faded into `next` by `mix`
    fn draw(&mut self, previous: usize, next: usize, mix: f32) -> Result<()>;
}

/// CPU presentation path
#[derive(Debug, Default)]
pub struct CpuPresenter {
    blended: Vec<u32>,
}

impl CpuPresenter {
    pub fn new(pixel_count: usize) -> Self {
        Self { blended: vec![0; pixel_count] }
    }
}

/// GPU presentation path
pub struct GpuPresenter {
    renderer: Box<dyn GpuRenderer>,
}

impl GpuPresenter {
    pub fn new(renderer: Box<dyn GpuRenderer>) -> Self {
        Self { renderer }
    }
}

/// Video output capability of a session
pub enum VideoOutput {
    /// No video stream
    Disabled,
    Cpu(CpuPresenter),
    Gpu(GpuPresenter),
}

impl VideoOutput {
    /// Make a freshly read frame available to the output
    pub fn upload(&mut self, slot: &FrameSlot, width: u32, height: u32) -> Result<()> {
        match self {
            VideoOutput::Gpu(gpu) => gpu.renderer.upload(slot.texture(), slot.pixels(), width, height),
            VideoOutput::Disabled | VideoOutput::Cpu(_) => Ok(()),
        }
    }

    /// Hand exactly one frame to the host
    pub fn present(
        &mut self,
        host: &mut dyn Host,
        slots: &FrameSlots,
        mix: f64,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let stride = width as usize * std::mem::size_of::<u32>();

        match self {
            VideoOutput::Disabled => {
                let (w, h) = FALLBACK_GEOMETRY;
                host.video_refresh(FrameRef::Dupe, w, h, w as usize * std::mem::size_of::<u32>());
            }
            _ if !slots.has_frame() => host.video_refresh(FrameRef::Dupe, width, height, stride),
            VideoOutput::Cpu(cpu) => {
                let previous = slots.previous();
                let next = slots.next();
                if mix >= 1.0 || !previous.is_filled() {
                    host.video_refresh(FrameRef::Pixels(bytemuck::cast_slice(next.pixels())), width, height, stride);
                } else {
                    blend_temporal(&mut cpu.blended, previous.pixels(), next.pixels(), mix);
                    host.video_refresh(FrameRef::Pixels(bytemuck::cast_slice(&cpu.blended)), width, height, stride);
                }
            }
            VideoOutput::Gpu(gpu) => {
                let previous = slots.previous();
                let next = slots.next();
                if previous.is_filled() {
                    gpu.renderer.draw(previous.texture(), next.texture(), mix as f32)?;
                } else {
                    gpu.renderer.draw(next.texture(), next.texture(), 1.0)?;
                }
                host.video_refresh(FrameRef::Hardware, width, height, stride);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for VideoOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoOutput::Disabled => f.write_str("Disabled"),
            VideoOutput::Cpu(_) => f.write_str("Cpu"),
            VideoOutput::Gpu(_) => f.write_str("Gpu"),
        }
    }
}

//! Frame slot pair and temporal blending
//!
//! The consumer keeps the two decoded frames bracketing the presentation
//! time. Advancing swaps the slots so `next` can be refilled in place;
//! timestamps only move forward between seeks and discontinuities.

/// One decoded frame held for presentation
#[derive(Debug, Clone)]
pub struct FrameSlot {
    /// Presentation timestamp in seconds
    pub pts: f64,

    /// XRGB8888 pixels, width * height
    pixels: Vec<u32>,

    /// Texture index used by a GPU renderer for this slot
    texture: usize,

    /// Whether a decoded frame has ever been read into this slot
    filled: bool,
}

impl FrameSlot {
    fn new(pixel_count: usize, texture: usize) -> Self {
        Self {
            pts: 0.0,
            pixels: vec![0; pixel_count],
            texture,
            filled: false,
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixel storage to overwrite with a fresh frame
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn texture(&self) -> usize {
        self.texture
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Record that a frame with `pts` now occupies the slot
    pub fn mark_filled(&mut self, pts: f64) {
        self.pts = pts;
        self.filled = true;
    }
}

/// The `previous` / `next` pair
#[derive(Debug, Clone)]
pub struct FrameSlots {
    previous: FrameSlot,
    next: FrameSlot,
}

impl FrameSlots {
    pub fn new(pixel_count: usize) -> Self {
        Self {
            previous: FrameSlot::new(pixel_count, 0),
            next: FrameSlot::new(pixel_count, 1),
        }
    }

    pub fn previous(&self) -> &FrameSlot {
        &self.previous
    }

    pub fn next(&self) -> &FrameSlot {
        &self.next
    }

    pub fn next_mut(&mut self) -> &mut FrameSlot {
        &mut self.next
    }

    /// Age out: `previous` takes over `next`, whose storage is reused
    pub fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.next);
    }

    /// Zero both timestamps so the next tick refills `next`
    pub fn reset_pts(&mut self) {
        self.previous.pts = 0.0;
        self.next.pts = 0.0;
    }

    /// At least one decoded frame is available to show
    pub fn has_frame(&self) -> bool {
        self.next.filled
    }
}

/// Cross-fade `previous` into `next` by `mix` using 8-bit fixed point weights
///
/// `mix` of 0 yields `previous`, 1 yields `next`.
pub fn blend_temporal(dst: &mut [u32], previous: &[u32], next: &[u32], mix: f64) {
    let mul_next = (mix.clamp(0.0, 1.0) * 256.0) as u32;
    let mul_prev = 256 - mul_next;

    for ((out, &p), &n) in dst.iter_mut().zip(previous).zip(next) {
        let r = ((n & 0xff0000) * mul_next + (p & 0xff0000) * mul_prev + 0x80) >> 8;
        let g = ((n & 0x00ff00) * mul_next + (p & 0x00ff00) * mul_prev + 0x80) >> 8;
        let b = ((n & 0x0000ff) * mul_next + (p & 0x0000ff) * mul_prev + 0x80) >> 8;
        *out = 0xff00_0000 | (r & 0xff0000) | (g & 0x00ff00) | (b & 0x0000ff);
    }
}

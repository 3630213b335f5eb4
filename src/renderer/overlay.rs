//! Subtitle overlay compositing
//!
//! Subtitle rendering itself is external. A [`SubtitleCompositor`] turns
//! timed events into coverage bitmaps, one bitmap per colored run of text,
//! and this module alpha-blends them onto a converted XRGB8888 frame
//! before it is queued.

use crate::decoder::SubtitleEvent;
use crate::utils::error::Result;

/// One colored 8-bit coverage bitmap placed on the frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayImage {
    /// Bitmap width in pixels
    pub width: u32,

    /// Bitmap height in pixels
    pub height: u32,

    /// Bytes per bitmap row
    pub stride: usize,

    /// Coverage values, 255 is fully covered
    pub bitmap: Vec<u8>,

    /// Text color as 0xRRGGBBTT, TT being transparency (0 is opaque)
    pub color: u32,

    /// Left edge on the frame
    pub dst_x: i32,

    /// Top edge on the frame
    pub dst_y: i32,
}

/// Subtitle renderer holding one track per subtitle stream
pub trait SubtitleCompositor: Send {
    /// Feed a decoded event into `track`
    fn process(&mut self, track: usize, event: &SubtitleEvent) -> Result<()>;

    /// Images to draw for `track` at `time_ms`
    fn render(&mut self, track: usize, time_ms: i64) -> Vec<OverlayImage>;

    /// Forget every event of `track` (used on seek)
    fn flush(&mut self, track: usize);
}

/// Blend `image` onto a `width` x `height` XRGB8888 frame
///
/// Pixels falling outside the frame are clipped.
pub fn blend_overlay(frame: &mut [u32], width: u32, height: u32, image: &OverlayImage) {
    let r = (image.color >> 24) & 0xff;
    let g = (image.color >> 16) & 0xff;
    let b = (image.color >> 8) & 0xff;
    let a = 255 - (image.color & 0xff);

    for y in 0..image.height as i32 {
        let fy = image.dst_y + y;
        if fy < 0 || fy >= height as i32 {
            continue;
        }

        let src_row = y as usize * image.stride;
        let dst_row = fy as usize * width as usize;

        for x in 0..image.width as i32 {
            let fx = image.dst_x + x;
            if fx < 0 || fx >= width as i32 {
                continue;
            }

            let coverage = match image.bitmap.get(src_row + x as usize) {
                Some(&c) => c as u32,
                None => continue,
            };

            let src_alpha = ((coverage * (a + 1)) >> 8) + 1;
            let dst_alpha = 256 - src_alpha;

            let dst = &mut frame[dst_row + fx as usize];
            let dst_r = (*dst >> 16) & 0xff;
            let dst_g = (*dst >> 8) & 0xff;
            let dst_b = *dst & 0xff;

            let out_r = (r * src_alpha + dst_r * dst_alpha) >> 8;
            let out_g = (g * src_alpha + dst_g * dst_alpha) >> 8;
            let out_b = (b * src_alpha + dst_b * dst_alpha) >> 8;

            *dst = 0xff00_0000 | (out_r << 16) | (out_g << 8) | out_b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(width: u32, height: u32, coverage: u8) -> OverlayImage {
        OverlayImage {
            width,
            height,
            stride: width as usize,
            bitmap: vec![coverage; (width * height) as usize],
            color: 0xffff_ff00,
            dst_x: 0,
            dst_y: 0,
        }
    }

    #[test]
    fn test_full_coverage_replaces_pixel() {
        let mut frame = vec![0u32; 4];
        blend_overlay(&mut frame, 2, 2, &white(1, 1, 255));
        assert_eq!(frame[0], 0xffff_ffff);
        assert_eq!(frame[1], 0);
    }

    #[test]
    fn test_zero_coverage_keeps_color() {
        let mut frame = vec![0x0010_2030u32; 1];
        blend_overlay(&mut frame, 1, 1, &white(1, 1, 0));
        // src_alpha bottoms out at 1/256
        assert_eq!(frame[0] & 0x00ff_ffff, 0x0010_2030);
    }

    #[test]
    fn test_half_coverage_mixes() {
        let mut frame = vec![0u32; 1];
        blend_overlay(&mut frame, 1, 1, &white(1, 1, 128));
        let red = (frame[0] >> 16) & 0xff;
        assert!((125..=130).contains(&red), "red = {}", red);
    }

    #[test]
    fn test_transparent_color_barely_shows() {
        let mut frame = vec![0u32; 1];
        let mut image = white(1, 1, 255);
        image.color = 0xffff_ffff;
        blend_overlay(&mut frame, 1, 1, &image);
        assert_eq!((frame[0] >> 16) & 0xff, 0);
    }

    #[test]
    fn test_clipped_at_frame_edges() {
        let mut frame = vec![0u32; 4];
        let mut image = white(3, 3, 255);
        image.dst_x = 1;
        image.dst_y = -1;
        blend_overlay(&mut frame, 2, 2, &image);
        assert_eq!(frame, vec![0, 0xffff_ffff, 0, 0xffff_ffff]);
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Native transform boundary
//!
//! The processed mode pipes each frame through a single synchronous
//! call, `transform(pixels, width, height)`, before upload. The
//! algorithm behind it is deliberately opaque to the pipeline: any
//! implementor of [`FrameTransform`] can be plugged in, and a failing
//! call never brings the pipeline down. On failure the raw frame is
//! forwarded unmodified; every failure is logged, and the controller
//! rate-limits the shell-facing notification to one per
//! [`crate::constants::TRANSFORM_NOTICE_INTERVAL`].

use crate::backends::format_converters::{gray_to_rgba, rgba_to_gray};
use crate::errors::TransformError;

/// Synchronous, pure-per-input frame transform.
///
/// Input and output are RGBA buffers of the same dimensions.
pub trait FrameTransform: Send + Sync {
    fn transform(&self, pixels: &[u8], width: u32, height: u32)
        -> Result<Vec<u8>, TransformError>;
}

/// Built-in edge-detection transform.
///
/// Grayscale conversion followed by a 3x3 Sobel operator with a fixed
/// magnitude threshold; edges render white on black. Stands in for the
/// external image-processing library the boundary was designed around.
pub struct EdgeDetect {
    /// Gradient magnitude below this renders black
    pub threshold: u16,
}

impl EdgeDetect {
    pub fn new() -> Self {
        Self { threshold: 96 }
    }
}

impl Default for EdgeDetect {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTransform for EdgeDetect {
    fn transform(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, TransformError> {
        let w = width as usize;
        let h = height as usize;
        if pixels.len() < w * h * 4 {
            return Err(TransformError::new(format!(
                "buffer too small: {} bytes for {}x{}",
                pixels.len(),
                width,
                height
            )));
        }

        let gray = rgba_to_gray(pixels, width, height);
        let mut edges = vec![0u8; w * h];

        // Sobel over the interior; the one-pixel border stays black.
        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let p = |dx: isize, dy: isize| -> i32 {
                    gray[(y as isize + dy) as usize * w + (x as isize + dx) as usize] as i32
                };

                let gx = -p(-1, -1) - 2 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2 * p(1, 0) + p(1, 1);
                let gy = -p(-1, -1) - 2 * p(0, -1) - p(1, -1) + p(-1, 1) + 2 * p(0, 1) + p(1, 1);

                let magnitude = ((gx * gx + gy * gy) as f32).sqrt() as u16;
                if magnitude >= self.threshold {
                    edges[y * w + x] = 255;
                }
            }
        }

        Ok(gray_to_rgba(&edges, width, height))
    }
}

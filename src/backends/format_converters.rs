// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion utilities
//!
//! Backends deliver frames in whatever layout the hardware produces;
//! everything is normalized to RGBA before it reaches the frame surface.

/// Convert YUYV (YUV 4:2:2) to RGBA
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    // YUYV: Y0 U Y1 V - processes 2 pixels at a time
    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        // Convert YUV to RGB (BT.601)
        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            rgba.push(r);
            rgba.push(g);
            rgba.push(b);
            rgba.push(255);

            if rgba.len() >= pixel_count * 4 {
                break;
            }
        }
        if rgba.len() >= pixel_count * 4 {
            break;
        }
    }

    rgba
}

/// Expand 8-bit grayscale to RGBA
pub fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for &luma in data.iter().take(pixel_count) {
        rgba.push(luma);
        rgba.push(luma);
        rgba.push(luma);
        rgba.push(255);
    }

    rgba
}

/// Collapse RGBA to 8-bit luma using BT.601 weights
pub fn rgba_to_gray(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut gray = Vec::with_capacity(pixel_count);

    for chunk in data.chunks_exact(4).take(pixel_count) {
        let r = chunk[0] as f32;
        let g = chunk[1] as f32;
        let b = chunk[2] as f32;
        gray.push((0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8);
    }

    gray
}

// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture backends

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Represents a physical capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Human-readable device name (V4L2 card)
    pub name: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
}

/// Requested or granted capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    /// Frames per second; backends treat this as a hint
    pub framerate: u32,
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.framerate)
    }
}

/// A single frame delivered by a capture backend.
///
/// Pixel data is always RGBA; backends convert before delivery so the
/// render side only ever uploads one layout. The buffer is reference
/// counted so the capture worker, the surface slot, and the render
/// loop can share it without copies.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub data: Arc<[u8]>,
    /// Monotonic frame number assigned by the backend
    pub sequence: u64,
    /// Capture timestamp, for latency diagnostics
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Time elapsed since the backend captured this frame
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Create an RGBA frame with a tight stride
    pub fn rgba(width: u32, height: u32, data: Arc<[u8]>, sequence: u64) -> Self {
        Self {
            width,
            height,
            stride: width * 4,
            data,
            sequence,
            captured_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_age_grows_from_capture_time() {
        let frame = CameraFrame::rgba(2, 2, Arc::from(vec![0u8; 16]), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(frame.age() >= Duration::from_millis(5));
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Shared latest-frame surface
//!
//! A single logical slot holding the most recent camera frame. Not a
//! queue: a new frame silently supersedes the pending one. Exactly two
//! actors touch the slot, the capture worker (sole writer) and the
//! render loop (sole reader), at independent rates; the reader may
//! sample the same frame twice or skip one entirely.
//!
//! The hand-off is an `Arc` pointer swap under a lock that is held only
//! for the swap itself, never across a GPU call or a pixel copy, so
//! neither side can observe a partially written frame or stall the
//! other for longer than the swap takes.

use crate::backends::types::CameraFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Mapping from the stored frame onto normalized texture coordinates.
///
/// Camera rows arrive top-to-bottom while texture space runs
/// bottom-to-top, and padded strides can leave a dead band on the right
/// edge; both are expressed here so the vertex stage can correct them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTransform {
    /// Texture coordinate scale (crops stride padding)
    pub scale: [f32; 2],
    /// Texture coordinate offset
    pub offset: [f32; 2],
}

impl Default for SurfaceTransform {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
        }
    }
}

/// A successfully acquired frame plus its sampling transform
#[derive(Debug, Clone)]
pub struct AcquiredFrame {
    pub frame: CameraFrame,
    pub transform: SurfaceTransform,
    /// Publish count at the time of acquisition
    pub generation: u64,
}

/// Single-producer single-consumer latest-frame slot
#[derive(Debug, Default)]
pub struct FrameSurface {
    slot: Mutex<Option<CameraFrame>>,
    /// Number of frames ever published; zero means not ready
    generation: AtomicU64,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new frame, superseding any pending one.
    ///
    /// Called only from the capture worker.
    pub fn publish(&self, frame: CameraFrame) {
        {
            let mut slot = self.slot.lock().unwrap();
            *slot = Some(frame);
        }
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Acquire the latest frame, or `None` before the first publish.
    ///
    /// Never blocks beyond the pointer swap; the returned frame shares
    /// its pixel buffer with the slot via `Arc`, no copy happens here.
    pub fn acquire(&self) -> Option<AcquiredFrame> {
        let generation = self.generation.load(Ordering::Acquire);
        if generation == 0 {
            return None;
        }

        let frame = {
            let slot = self.slot.lock().unwrap();
            slot.clone()?
        };

        let transform = Self::sampling_transform(&frame);
        Some(AcquiredFrame {
            frame,
            transform,
            generation,
        })
    }

    /// Number of frames published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True once at least one frame has been published
    pub fn is_ready(&self) -> bool {
        self.generation() > 0
    }

    /// Drop any pending frame and reset readiness.
    ///
    /// Used when a session restarts so stale imagery is not sampled
    /// against a new stream.
    pub fn reset(&self) {
        let mut slot = self.slot.lock().unwrap();
        *slot = None;
        drop(slot);
        self.generation.store(0, Ordering::Release);
    }

    fn sampling_transform(frame: &CameraFrame) -> SurfaceTransform {
        // Crop away stride padding: valid texels span width/stride_px of
        // the uploaded row.
        let bytes_per_pixel = (frame.stride / frame.width.max(1)).max(1);
        let stride_px = frame.stride as f32 / bytes_per_pixel as f32;
        let x_scale = frame.width as f32 / stride_px.max(1.0);

        SurfaceTransform {
            scale: [x_scale, 1.0],
            offset: [0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::types::CameraFrame;
    use std::sync::Arc;
    use std::time::Duration;

    fn solid_frame(value: u8, sequence: u64) -> CameraFrame {
        CameraFrame::rgba(8, 8, Arc::from(vec![value; 8 * 8 * 4]), sequence)
    }

    #[test]
    fn test_not_ready_before_first_publish() {
        let surface = FrameSurface::new();
        assert!(!surface.is_ready());
        assert!(surface.acquire().is_none());
    }

    #[test]
    fn test_ready_after_one_publish() {
        let surface = FrameSurface::new();
        surface.publish(solid_frame(7, 1));

        let acquired = surface.acquire().expect("frame after publish");
        assert_eq!(acquired.frame.sequence, 1);
        assert_eq!(acquired.generation, 1);
        assert!(surface.is_ready());
    }

    #[test]
    fn test_new_frame_supersedes_pending() {
        let surface = FrameSurface::new();
        surface.publish(solid_frame(1, 1));
        surface.publish(solid_frame(2, 2));

        let acquired = surface.acquire().expect("frame");
        assert_eq!(acquired.frame.sequence, 2);
        assert_eq!(surface.generation(), 2);
    }

    #[test]
    fn test_reader_may_sample_same_frame_twice() {
        let surface = FrameSurface::new();
        surface.publish(solid_frame(3, 9));

        let a = surface.acquire().expect("first");
        let b = surface.acquire().expect("second");
        assert_eq!(a.frame.sequence, b.frame.sequence);
    }

    #[test]
    fn test_reset_returns_to_not_ready() {
        let surface = FrameSurface::new();
        surface.publish(solid_frame(1, 1));
        surface.reset();
        assert!(!surface.is_ready());
        assert!(surface.acquire().is_none());
    }

    #[test]
    fn test_stride_padding_is_cropped() {
        let mut frame = solid_frame(0, 1);
        // 8 px wide but 10 px stride: only 80% of the row is valid
        frame.stride = 10 * 4;
        let surface = FrameSurface::new();
        surface.publish(frame);

        let acquired = surface.acquire().expect("frame");
        assert!((acquired.transform.scale[0] - 0.8).abs() < 1e-6);
    }

    /// Fuzz the writer/reader hand-off: every acquired frame must be
    /// internally consistent (a single fill value), never a mix of two
    /// publishes.
    #[test]
    fn test_concurrent_write_read_never_tears() {
        let surface = Arc::new(FrameSurface::new());
        let writer_surface = Arc::clone(&surface);

        let writer = std::thread::spawn(move || {
            for seq in 1..=500u64 {
                let value = (seq % 251) as u8;
                writer_surface.publish(solid_frame(value, seq));
                if seq % 50 == 0 {
                    std::thread::sleep(Duration::from_micros(100));
                }
            }
        });

        let mut observed = 0u64;
        while observed < 500 {
            if let Some(acquired) = surface.acquire() {
                let expected = (acquired.frame.sequence % 251) as u8;
                assert!(
                    acquired.frame.data.iter().all(|&b| b == expected),
                    "torn frame observed at sequence {}",
                    acquired.frame.sequence
                );
                observed = observed.max(acquired.frame.sequence);
            }
        }

        writer.join().unwrap();
    }
}

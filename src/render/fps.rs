// SPDX-License-Identifier: GPL-3.0-only

//! Frame rate measurement
//!
//! Counts rendered frames over a fixed wall-clock window and reports
//! the count when the window elapses. The reported figure is the frame
//! count itself, not a normalized rate, so a window that runs slightly
//! long still reports what was actually drawn in it.

use crate::constants::FPS_WINDOW;
use std::time::Instant;

/// Windowed frame counter for the render loop
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Record one rendered frame at `now`.
    ///
    /// Returns the frame count when a full window has elapsed; the
    /// counter and window restart from that instant.
    pub fn tick_at(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;

        if now.duration_since(self.window_start) >= FPS_WINDOW {
            let report = self.frames;
            self.frames = 0;
            self.window_start = now;
            return Some(report);
        }

        None
    }

    /// Record one rendered frame at the current time
    pub fn tick(&mut self) -> Option<u32> {
        self.tick_at(Instant::now())
    }

    /// Restart the window without reporting
    pub fn reset(&mut self) {
        self.frames = 0;
        self.window_start = Instant::now();
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

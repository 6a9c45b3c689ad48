// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default capture width in pixels
pub const DEFAULT_WIDTH: u32 = 1280;

/// Default capture height in pixels
pub const DEFAULT_HEIGHT: u32 = 720;

/// Default capture framerate (frames per second)
pub const DEFAULT_FRAMERATE: u32 = 30;

/// Display refresh interval the driver loop targets (~60 Hz)
pub const REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

/// Length of the FPS measurement window
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Minimum interval between transform-failure notifications to the shell.
///
/// Every failing frame is still logged; only the controller-level
/// notification is rate-limited, so a persistently broken transform does
/// not flood the UI boundary at camera framerate.
pub const TRANSFORM_NOTICE_INTERVAL: Duration = Duration::from_secs(1);

/// Number of memory-mapped capture buffers requested from V4L2
pub const CAPTURE_BUFFER_COUNT: u32 = 4;

/// Config directory name under the user config root
pub const APP_CONFIG_DIR: &str = "edgeview";

/// Config file name
pub const CONFIG_FILE: &str = "config.json";

// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the headless pipeline driver
//!
//! This module provides command-line functionality for:
//! - Running the capture-to-render pipeline against an offscreen target
//! - Listing available capture devices

use edgeview::backends::test_pattern::{TestPatternBackend, TestPatternConfig};
use edgeview::backends::types::CaptureFormat;
use edgeview::backends::{self, CaptureBackend};
use edgeview::config::Config;
use edgeview::constants::REFRESH_INTERVAL;
use edgeview::controller::{PipelineController, PipelineObserver};
use edgeview::errors::{FaultKind, RenderError, RenderResult};
use edgeview::render::RenderContext;
use edgeview::transform::EdgeDetect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Options for the `run` command after merging CLI flags over config
pub struct RunOptions {
    pub processed: bool,
    pub test_pattern: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frames: Option<u64>,
}

/// List all available capture devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = backends::get_backend();
    let devices = backend.list_devices();

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available capture devices:");
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {} ({})", index, device.name, device.path);
    }

    Ok(())
}

/// Observer that reports to the terminal and flags fatal faults
struct ConsoleObserver {
    fatal: Arc<AtomicBool>,
}

impl PipelineObserver for ConsoleObserver {
    fn on_fps_update(&mut self, fps: u32) {
        println!("FPS: {}", fps);
    }

    fn on_fault(&mut self, fault: FaultKind) {
        eprintln!("Fault: {}", fault);
        // A broken transform degrades to raw output; everything else
        // means capture is gone and the headless loop should exit.
        if fault != FaultKind::TransformFailed {
            self.fatal.store(true, Ordering::SeqCst);
        }
    }

    fn on_mode_changed(&mut self, processed: bool) {
        println!(
            "Mode: {}",
            if processed { "processed" } else { "raw" }
        );
    }

    fn on_streaming(&mut self, device: &str, format: CaptureFormat) {
        println!("Streaming from {} at {}", device, format);
    }
}

/// Run the pipeline against an offscreen render target until
/// interrupted, a frame budget is reached, or capture is lost.
pub fn run_pipeline(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let format = CaptureFormat {
        width: options.width.unwrap_or(config.width),
        height: options.height.unwrap_or(config.height),
        framerate: config.framerate,
    };

    let backend: Box<dyn CaptureBackend> = if options.test_pattern {
        Box::new(TestPatternBackend::new(TestPatternConfig::default()))
    } else {
        backends::get_backend()
    };

    let fatal = Arc::new(AtomicBool::new(false));
    let mut controller = PipelineController::new(
        backend,
        Arc::new(EdgeDetect::new()),
        format,
        Box::new(ConsoleObserver {
            fatal: Arc::clone(&fatal),
        }),
    );
    controller.set_mode(options.processed || config.processed_by_default);
    if !options.test_pattern {
        controller.set_preferred_device(config.device_path.clone());
    }

    let context = create_render_context()?;
    let device = context.device.clone();
    let queue = context.queue.clone();
    let target_format = context.format;
    controller.init_render(context)?;
    controller.resize(format.width, format.height);

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("edgeview offscreen target"),
        size: wgpu::Extent3d {
            width: format.width,
            height: format.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: target_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    controller.start();
    info!(format = %format, "Pipeline driver running");

    let mut drawn: u64 = 0;
    while !stop.load(Ordering::SeqCst) && !fatal.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("edgeview driver encoder"),
        });
        controller.draw(&mut encoder, &target_view)?;
        queue.submit(std::iter::once(encoder.finish()));

        drawn += 1;
        if let Some(limit) = options.frames
            && drawn >= limit
        {
            break;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < REFRESH_INTERVAL {
            std::thread::sleep(REFRESH_INTERVAL - elapsed);
        }
    }

    controller.stop();
    info!(frames = drawn, "Pipeline driver stopped");
    Ok(())
}

/// Acquire a headless GPU device and queue.
///
/// No window surface exists in driver mode, so any adapter will do;
/// the target format is fixed rather than negotiated.
fn create_render_context() -> RenderResult<RenderContext> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .map_err(|e| RenderError::InitFailed(e.to_string()))?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("edgeview device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        experimental_features: wgpu::ExperimentalFeatures::disabled(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::Off,
    }))
    .map_err(|e| RenderError::InitFailed(e.to_string()))?;

    Ok(RenderContext {
        device,
        queue,
        format: wgpu::TextureFormat::Rgba8Unorm,
    })
}

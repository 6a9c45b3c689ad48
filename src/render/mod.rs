// SPDX-License-Identifier: GPL-3.0-only

//! GPU render loop
//!
//! Samples the latest frame from the shared surface, uploads it into a
//! persistent texture and draws a full-screen quad through the
//! validated shader program. Runs at display cadence, decoupled from
//! capture: a missing frame produces a clear-only pass, never a stall.
//!
//! All wgpu objects live on the render side; nothing here blocks on
//! capture beyond the surface slot's pointer swap.

pub mod fps;
pub mod shader;

use crate::errors::{RenderError, RenderResult};
use crate::surface::{AcquiredFrame, FrameSurface};
use bytemuck::{Pod, Zeroable};
use self::fps::FpsCounter;
use self::shader::ShaderProgram;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Clear color shown before the first frame arrives
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.02,
    a: 1.0,
};

/// Owned GPU handles the render loop draws with
pub struct RenderContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
}

/// Uniform block consumed by the quad vertex stage.
///
/// Layout must match `QuadUniform` in quad.vert.wgsl.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadUniform {
    tex_scale: [f32; 2],
    tex_offset: [f32; 2],
    pos_scale: [f32; 2],
    _pad: [f32; 2],
}

/// Persistent frame texture, recreated only when dimensions change
struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Everything that exists only after `on_surface_created`
struct GpuState {
    context: RenderContext,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    frame_texture: Option<FrameTexture>,
    bind_group: Option<wgpu::BindGroup>,
}

/// The render half of the pipeline
pub struct RenderLoop {
    surface: Arc<FrameSurface>,
    gpu: Option<GpuState>,
    fps: FpsCounter,
    viewport: (u32, u32),
}

impl RenderLoop {
    pub fn new(surface: Arc<FrameSurface>) -> Self {
        Self {
            surface,
            gpu: None,
            fps: FpsCounter::new(),
            viewport: (0, 0),
        }
    }

    /// True once the GPU state is built and draws can proceed
    pub fn is_ready(&self) -> bool {
        self.gpu.is_some()
    }

    /// Compile the shader program and build the GPU state.
    ///
    /// Must run before the first draw. A compile or link failure leaves
    /// the loop uninitialized; the caller decides whether that is fatal.
    pub fn on_surface_created(&mut self, context: RenderContext) -> RenderResult<()> {
        let program = ShaderProgram::quad()?;
        let (pipeline, bind_group_layout) =
            program.create_pipeline(&context.device, context.format);

        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edgeview frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgeview quad uniform"),
            size: std::mem::size_of::<QuadUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.fps.reset();
        self.gpu = Some(GpuState {
            context,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            frame_texture: None,
            bind_group: None,
        });

        info!("Render loop initialized");
        Ok(())
    }

    /// Record the current drawable size for aspect-fit placement
    pub fn on_surface_resized(&mut self, width: u32, height: u32) {
        debug!(width, height, "Render viewport resized");
        self.viewport = (width, height);
    }

    /// Draw one frame into `target`.
    ///
    /// Returns a frame count when the FPS window elapsed during this
    /// draw. With no frame published yet the pass only clears; the
    /// tick still counts, the loop is running either way.
    pub fn on_draw_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> RenderResult<Option<u32>> {
        let gpu = self.gpu.as_mut().ok_or(RenderError::NotReady)?;

        match self.surface.acquire() {
            Some(acquired) => {
                trace!(
                    sequence = acquired.frame.sequence,
                    age_us = acquired.frame.age().as_micros() as u64,
                    "Sampling frame"
                );
                upload_frame(gpu, &acquired);
                write_uniform(gpu, &acquired, self.viewport);
                draw_quad(gpu, encoder, target);
            }
            None => {
                clear_pass(encoder, target);
            }
        }

        Ok(self.fps.tick())
    }
}

/// Upload the frame into the persistent texture, recreating it when
/// the incoming dimensions differ.
fn upload_frame(gpu: &mut GpuState, acquired: &AcquiredFrame) {
    let frame = &acquired.frame;

    let needs_new = gpu
        .frame_texture
        .as_ref()
        .map(|t| t.width != frame.width || t.height != frame.height)
        .unwrap_or(true);

    if needs_new {
        debug!(
            width = frame.width,
            height = frame.height,
            "Creating frame texture"
        );
        let texture = gpu.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgeview frame texture"),
            size: wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        gpu.frame_texture = Some(FrameTexture {
            texture,
            view,
            width: frame.width,
            height: frame.height,
        });
        gpu.bind_group = None;
    }

    let tex = gpu.frame_texture.as_ref().unwrap();
    gpu.context.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &tex.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &frame.data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(frame.stride),
            rows_per_image: Some(frame.height),
        },
        wgpu::Extent3d {
            width: frame.width,
            height: frame.height,
            depth_or_array_layers: 1,
        },
    );

    if gpu.bind_group.is_none() {
        let tex = gpu.frame_texture.as_ref().unwrap();
        gpu.bind_group = Some(gpu.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edgeview quad bind group"),
            layout: &gpu.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                },
            ],
        }));
    }
}

fn write_uniform(gpu: &GpuState, acquired: &AcquiredFrame, viewport: (u32, u32)) {
    let uniform = QuadUniform {
        tex_scale: acquired.transform.scale,
        tex_offset: acquired.transform.offset,
        pos_scale: aspect_fit(
            acquired.frame.width,
            acquired.frame.height,
            viewport.0,
            viewport.1,
        ),
        _pad: [0.0; 2],
    };
    gpu.context
        .queue
        .write_buffer(&gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
}

fn draw_quad(gpu: &GpuState, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
    let Some(bind_group) = gpu.bind_group.as_ref() else {
        return;
    };

    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("edgeview quad pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });

    rpass.set_pipeline(&gpu.pipeline);
    rpass.set_bind_group(0, bind_group, &[]);
    rpass.draw(0..4, 0..1);
}

fn clear_pass(encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("edgeview clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

/// Scale factors that letterbox the frame into the viewport while
/// preserving its aspect ratio. A zero-sized viewport fills the clip
/// space unscaled.
fn aspect_fit(frame_w: u32, frame_h: u32, view_w: u32, view_h: u32) -> [f32; 2] {
    if frame_w == 0 || frame_h == 0 || view_w == 0 || view_h == 0 {
        return [1.0, 1.0];
    }

    let frame_aspect = frame_w as f32 / frame_h as f32;
    let view_aspect = view_w as f32 / view_h as f32;

    if frame_aspect >= view_aspect {
        [1.0, view_aspect / frame_aspect]
    } else {
        [frame_aspect / view_aspect, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_fit_matching_ratios_fill() {
        assert_eq!(aspect_fit(1280, 720, 1920, 1080), [1.0, 1.0]);
    }

    #[test]
    fn test_aspect_fit_wide_frame_letterboxes_vertically() {
        let [sx, sy] = aspect_fit(1280, 720, 1080, 1080);
        assert_eq!(sx, 1.0);
        assert!((sy - 720.0 / 1280.0).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_fit_tall_frame_pillarboxes() {
        let [sx, sy] = aspect_fit(480, 640, 1920, 1080);
        assert_eq!(sy, 1.0);
        assert!((sx - (480.0 / 640.0) / (1920.0 / 1080.0)).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_fit_zero_viewport_is_identity() {
        assert_eq!(aspect_fit(1280, 720, 0, 0), [1.0, 1.0]);
    }

    #[test]
    fn test_uniform_layout_is_32_bytes() {
        assert_eq!(std::mem::size_of::<QuadUniform>(), 32);
    }

    #[test]
    fn test_draw_before_init_reports_not_ready() {
        let surface = Arc::new(FrameSurface::new());
        let render = RenderLoop::new(surface);
        assert!(!render.is_ready());
    }
}

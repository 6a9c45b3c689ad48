// SPDX-License-Identifier: GPL-3.0-only

//! Shader program compilation
//!
//! The vertex and fragment stages are authored as separate WGSL
//! sources so a failure can be attributed to its stage. Each stage is
//! parsed and validated on its own first, then the concatenated
//! program is validated as a whole; cross-stage problems surface as a
//! link error. Only a fully validated program ever reaches the GPU.

use crate::errors::{RenderError, RenderResult, ShaderStage};

pub const QUAD_VERTEX_SHADER: &str = include_str!("shaders/quad.vert.wgsl");
pub const QUAD_FRAGMENT_SHADER: &str = include_str!("shaders/quad.frag.wgsl");

const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

/// A validated vertex+fragment program
pub struct ShaderProgram {
    combined_source: String,
}

impl ShaderProgram {
    /// Compile and link the built-in textured quad program
    pub fn quad() -> RenderResult<Self> {
        Self::compile(QUAD_VERTEX_SHADER, QUAD_FRAGMENT_SHADER)
    }

    /// Compile both stages and link them.
    ///
    /// Stage errors carry the full diagnostic log rather than a bare
    /// failure flag; a renderer that cannot compile its program is not
    /// recoverable and the log is the only useful artifact.
    pub fn compile(vertex_source: &str, fragment_source: &str) -> RenderResult<Self> {
        validate_stage(ShaderStage::Vertex, vertex_source, VERTEX_ENTRY)?;
        validate_stage(ShaderStage::Fragment, fragment_source, FRAGMENT_ENTRY)?;

        let combined_source = format!("{}\n{}", vertex_source, fragment_source);
        let module = naga::front::wgsl::parse_str(&combined_source).map_err(|e| {
            RenderError::Link {
                log: e.emit_to_string(&combined_source),
            }
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| RenderError::Link {
            log: e.emit_to_string(&combined_source),
        })?;

        Ok(Self { combined_source })
    }

    /// Create the wgpu module for the linked program
    pub fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edgeview quad shader"),
            source: wgpu::ShaderSource::Wgsl(self.combined_source.as_str().into()),
        })
    }

    /// Build the quad render pipeline for the given target format.
    ///
    /// Returns the pipeline together with its bind group layout so the
    /// caller can bind the frame texture and uniform.
    pub fn create_pipeline(
        &self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
        let module = self.create_module(device);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgeview quad bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgeview quad pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("edgeview quad pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        (pipeline, bind_group_layout)
    }
}

/// Parse and validate one stage standalone, attributing failures to it
fn validate_stage(stage: ShaderStage, source: &str, entry: &str) -> RenderResult<()> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| RenderError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| RenderError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;

    if !module.entry_points.iter().any(|ep| ep.name == entry) {
        return Err(RenderError::ShaderCompile {
            stage,
            log: format!("missing entry point `{}`", entry),
        });
    }

    Ok(())
}

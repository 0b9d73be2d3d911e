//! Core GPU renderer for the treemap
//!
//! One pipeline draws everything: base rectangles, token-quad text and
//! overlay quads, all sharing the flat-color vertex layout. The vertex and
//! index buffers are sized from the tree at load time and recreated only
//! when the buffer generation changes (a new tree replaced the old one);
//! per-frame work is dirty-range uploads plus a handful of ranged
//! `draw_indexed` calls.

use super::instance::{vertex_layout, Uniforms};
use super::FrameUploads;
use crate::buffers::{quad_indices, VERTEX_SIZE};
use log::info;
use wgpu::util::DeviceExt;

/// Per-generation GPU buffers
struct FrameBuffers {
    generation: u64,
    rect_vertices: wgpu::Buffer,
    rect_indices: wgpu::Buffer,
    text_vertices: wgpu::Buffer,
    text_indices: wgpu::Buffer,
    overlay_vertices: wgpu::Buffer,
    overlay_indices: wgpu::Buffer,
}

/// Treemap renderer living in the egui callback resources
pub struct TreemapRenderer {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    buffers: Option<FrameBuffers>,
}

impl TreemapRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Treemap Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/treemap.wgsl").into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Treemap Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Treemap Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Treemap Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Treemap Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Treemap Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            buffers: None,
        }
    }

    fn quad_buffers(
        device: &wgpu::Device,
        label: &str,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::Buffer) {
        let vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64 * VERTEX_SIZE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&quad_indices(capacity)),
            usage: wgpu::BufferUsages::INDEX,
        });
        (vertices, indices)
    }

    fn ensure_buffers(&mut self, device: &wgpu::Device, uploads: &FrameUploads) {
        if self
            .buffers
            .as_ref()
            .is_some_and(|b| b.generation == uploads.generation)
        {
            return;
        }
        info!(
            "gpu: allocating buffers for generation {} ({} rect verts, {} text verts)",
            uploads.generation, uploads.rect_capacity, uploads.text_capacity
        );
        let (rect_vertices, rect_indices) =
            Self::quad_buffers(device, "Treemap Rect Buffer", uploads.rect_capacity);
        let (text_vertices, text_indices) =
            Self::quad_buffers(device, "Treemap Text Buffer", uploads.text_capacity);
        let (overlay_vertices, overlay_indices) =
            Self::quad_buffers(device, "Treemap Overlay Buffer", uploads.overlay_capacity);
        self.buffers = Some(FrameBuffers {
            generation: uploads.generation,
            rect_vertices,
            rect_indices,
            text_vertices,
            text_indices,
            overlay_vertices,
            overlay_indices,
        });
    }

    /// Upload this frame's dirty ranges and uniforms
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, uploads: &FrameUploads) {
        self.ensure_buffers(device, uploads);
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&uploads.uniforms),
        );
        let Some(buffers) = &self.buffers else {
            return;
        };
        for (offset, data) in &uploads.rects {
            queue.write_buffer(
                &buffers.rect_vertices,
                *offset as u64 * VERTEX_SIZE,
                bytemuck::cast_slice(data),
            );
        }
        for (offset, data) in &uploads.text {
            queue.write_buffer(
                &buffers.text_vertices,
                *offset as u64 * VERTEX_SIZE,
                bytemuck::cast_slice(data),
            );
        }
        if let Some(overlay) = &uploads.overlay {
            if !overlay.is_empty() {
                queue.write_buffer(&buffers.overlay_vertices, 0, bytemuck::cast_slice(overlay));
            }
        }
    }

    /// Issue the ranged draws: covering-subtree rectangles, materialized
    /// text blocks, then overlays on top
    pub fn paint(&self, pass: &mut wgpu::RenderPass<'static>, uploads: &FrameUploads) {
        let Some(buffers) = &self.buffers else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);

        if !uploads.rect_draw.is_empty() {
            pass.set_vertex_buffer(0, buffers.rect_vertices.slice(..));
            pass.set_index_buffer(buffers.rect_indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(uploads.rect_draw.clone(), 0, 0..1);
        }

        if !uploads.text_draws.is_empty() {
            pass.set_vertex_buffer(0, buffers.text_vertices.slice(..));
            pass.set_index_buffer(buffers.text_indices.slice(..), wgpu::IndexFormat::Uint32);
            for range in &uploads.text_draws {
                if !range.is_empty() {
                    pass.draw_indexed(range.clone(), 0, 0..1);
                }
            }
        }

        if uploads.overlay_quads > 0 {
            pass.set_vertex_buffer(0, buffers.overlay_vertices.slice(..));
            pass.set_index_buffer(buffers.overlay_indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..uploads.overlay_quads * 6, 0, 0..1);
        }
    }
}

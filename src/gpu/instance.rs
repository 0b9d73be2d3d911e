//! GPU uniform data and the shared vertex layout

use crate::buffers::VERTEX_SIZE;
use crate::camera::WorldRect;
use glam::Mat4;

/// Uniform data for the treemap pipeline
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    pub view_proj: [[f32; 4]; 4],
}

impl Uniforms {
    /// Orthographic projection of the camera's world window
    pub fn from_window(window: &WorldRect) -> Self {
        let m = Mat4::orthographic_rh(
            window.min.x,
            window.max.x,
            window.min.y,
            window.max.y,
            -10.0,
            10.0,
        );
        Self {
            view_proj: m.to_cols_array_2d(),
        }
    }
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

/// Layout matching [`crate::buffers::Vertex`]
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: VERTEX_SIZE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

//! GPU rendering module
//!
//! Uploads the engine's CPU-side vertex arrays to wgpu buffers and draws
//! them from inside an egui paint callback. The engine hands over a
//! [`FrameUploads`]: the dirty-range writes for this frame, the uniform
//! matrix derived from the camera window, and the draw list bounded by the
//! covering node's range.
//!
//! - [`instance`] - Pod uniform data and the shared vertex layout
//! - [`renderer`] - pipeline, GPU buffers and ranged draws
//! - [`callback`] - egui paint callback integration
//! - `shaders/` - WGSL shader for the flat-colored treemap geometry

pub mod callback;
pub mod instance;
pub mod renderer;

pub use callback::TreemapCallback;
pub use instance::Uniforms;
pub use renderer::TreemapRenderer;

use crate::buffers::{Upload, Vertex};
use std::ops::Range;

/// Everything the GPU side needs for one frame
pub struct FrameUploads {
    /// Buffer generation; a mismatch makes the renderer rebuild its buffers
    pub generation: u64,
    pub rect_capacity: u32,
    pub text_capacity: u32,
    pub overlay_capacity: u32,
    /// Dirty-range writes into the rectangle buffer
    pub rects: Vec<Upload>,
    /// Dirty-range writes into the text arena
    pub text: Vec<Upload>,
    /// Full overlay rewrite, when the overlays changed
    pub overlay: Option<Vec<Vertex>>,
    pub overlay_quads: u32,
    pub uniforms: Uniforms,
    /// Index range of the covering subtree's rectangles
    pub rect_draw: Range<u32>,
    /// Index ranges of materialized text blocks
    pub text_draws: Vec<Range<u32>>,
}

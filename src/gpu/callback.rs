//! egui paint callback integration
//!
//! The session builds a [`FrameUploads`] each frame; the callback hands it
//! to the [`TreemapRenderer`] stored in egui's callback resources. The
//! renderer is inserted there once at application startup, so no global
//! state is involved.

use super::{FrameUploads, TreemapRenderer};

/// Paint callback carrying one frame of uploads and draws
pub struct TreemapCallback {
    pub uploads: FrameUploads,
}

impl egui_wgpu::CallbackTrait for TreemapCallback {
    fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        if let Some(renderer) = callback_resources.get_mut::<TreemapRenderer>() {
            renderer.prepare(device, queue, &self.uploads);
        }
        Vec::new()
    }

    fn paint(
        &self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'static>,
        callback_resources: &egui_wgpu::CallbackResources,
    ) {
        if let Some(renderer) = callback_resources.get::<TreemapRenderer>() {
            renderer.paint(render_pass, &self.uploads);
        }
    }
}

use std::sync::Arc;

use crate::render::gpu::GpuContext;
use crate::render::texture::{DepthBuffer, GpuTexture};
use crate::texture::{Texture, TextureFilter};

/// Offscreen framebuffer.
///
/// The color attachment is registered with the context under the id of
/// [`RenderTarget::texture`], so whatever was rendered can be drawn as a
/// sprite afterwards.
pub struct RenderTarget {
    color: Arc<GpuTexture>,
    depth: DepthBuffer,
    texture: Arc<Texture>,
}

impl RenderTarget {
    pub const FORMAT: wgpu::TextureFormat = GpuTexture::FORMAT;

    pub fn new(gpu: &GpuContext, width: u32, height: u32, filter: TextureFilter) -> Self {
        let texture = Arc::new(Texture::empty(width, height, filter));
        let color = Arc::new(GpuTexture::render_target(
            &gpu.device,
            gpu.texture_layout(),
            width,
            height,
            filter,
            "render-target",
        ));
        gpu.register_texture(texture.id(), Arc::clone(&color));
        Self {
            color,
            depth: DepthBuffer::create(&gpu.device, width, height),
            texture,
        }
    }

    /// Handle to use as a sprite texture.
    pub fn texture(&self) -> Arc<Texture> {
        Arc::clone(&self.texture)
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        self.color.view()
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        self.depth.view()
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    /// Removes the color attachment from the context's texture cache.
    pub fn release(self, gpu: &GpuContext) {
        gpu.release_texture(self.texture.id());
    }
}

//! wgpu backend shared by the renderer systems.

pub mod buffer;
pub mod common;
pub mod gpu;
pub mod shader;
pub mod surface;
pub mod target;
pub mod texture;

use anyhow::Result;
use bytemuck::Pod;

pub use buffer::GpuBuffer;
pub use common::{PipelineKey, RenderSettings, Uniform2D, Uniform3D};
pub use gpu::GpuContext;
pub use shader::{Shader, ShaderKind};
pub use surface::WindowSurface;
pub use target::RenderTarget;
pub use texture::{DepthBuffer, GpuTexture};

use crate::system::Systems;
use crate::texture::{Texture, TextureId};

/// One textured, indexed draw.
pub struct DrawCall<'d, U: Pod> {
    pub shader: ShaderKind,
    pub uniforms: &'d U,
    pub texture: &'d Texture,
    pub positions: &'d GpuBuffer,
    pub tex_coords: &'d GpuBuffer,
    pub indices: &'d GpuBuffer,
}

/// Open render pass handed to every system's `render`.
///
/// Pipeline and texture bindings are only changed when they differ from
/// the previous draw.
pub struct Frame<'a, 'p> {
    gpu: &'a GpuContext,
    pass: &'a mut wgpu::RenderPass<'p>,
    key: PipelineKey,
    bound_shader: Option<ShaderKind>,
    bound_texture: Option<TextureId>,
    draw_calls: usize,
    texture_binds: usize,
}

impl<'a, 'p> Frame<'a, 'p> {
    /// Wraps an open pass. Uniform slots of earlier frames are recycled.
    pub fn new(gpu: &'a GpuContext, pass: &'a mut wgpu::RenderPass<'p>, key: PipelineKey) -> Self {
        gpu.reset_uniforms();
        Self {
            gpu,
            pass,
            key,
            bound_shader: None,
            bound_texture: None,
            draw_calls: 0,
            texture_binds: 0,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        self.gpu
    }

    pub fn key(&self) -> PipelineKey {
        self.key
    }

    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    /// How often a texture bind group was set during this frame.
    pub fn texture_binds(&self) -> usize {
        self.texture_binds
    }

    pub fn draw<U: Pod>(&mut self, call: DrawCall<'_, U>) -> Result<()> {
        if call.indices.is_empty() || call.positions.is_empty() || call.tex_coords.is_empty() {
            return Ok(());
        }
        if self.bound_shader != Some(call.shader) {
            let pipeline = self.gpu.pipeline(call.shader, self.key)?;
            self.pass.set_pipeline(&pipeline);
            self.bound_shader = Some(call.shader);
        }
        if self.bound_texture != Some(call.texture.id()) {
            let Some(texture) = self.gpu.texture(call.texture) else {
                return Ok(());
            };
            self.pass.set_bind_group(1, texture.bind_group(), &[]);
            self.bound_texture = Some(call.texture.id());
            self.texture_binds += 1;
        }
        let (uniforms, offset) = self.gpu.push_uniforms(bytemuck::bytes_of(call.uniforms))?;
        self.pass.set_bind_group(0, &uniforms, &[offset]);
        self.pass.set_vertex_buffer(0, call.positions.slice());
        self.pass.set_vertex_buffer(1, call.tex_coords.slice());
        self.pass
            .set_index_buffer(call.indices.slice(), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..call.indices.len(), 0, 0..1);
        self.draw_calls += 1;
        Ok(())
    }
}

/// Records one pass over `color` and `depth` in which every system renders,
/// then submits it. Returns the number of draw calls.
pub fn render_systems(
    gpu: &GpuContext,
    color: &wgpu::TextureView,
    depth: &wgpu::TextureView,
    format: wgpu::TextureFormat,
    settings: &RenderSettings,
    systems: &mut Systems,
) -> Result<usize> {
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });
    let color_load = if settings.clear_color_buffer {
        wgpu::LoadOp::Clear(settings.clear_color_wgpu())
    } else {
        wgpu::LoadOp::Load
    };
    let depth_load = if settings.clear_depth_buffer {
        wgpu::LoadOp::Clear(1.0)
    } else {
        wgpu::LoadOp::Load
    };

    let draw_calls = {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let mut frame = Frame::new(gpu, &mut pass, PipelineKey::new(format, settings));
        systems.render_all(&mut frame)?;
        frame.draw_calls()
    };

    gpu.queue.submit(std::iter::once(encoder.finish()));
    Ok(draw_calls)
}

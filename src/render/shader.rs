//! Built-in WGSL shaders and their pipelines.

use crate::render::common::PipelineKey;
use crate::render::texture::DepthBuffer;

/// The three default shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Textured 2D quads, positions are vec2.
    Sprite2D,
    /// Textured meshes, positions are vec3.
    Model3D,
    /// Like `Sprite2D`, with the texel multiplied by a color.
    Text,
}

const POSITION_2D: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![0 => Float32x2];
const POSITION_3D: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![0 => Float32x3];
const TEX_COORD: &[wgpu::VertexAttribute] = &wgpu::vertex_attr_array![1 => Float32x2];

impl ShaderKind {
    pub const ALL: [ShaderKind; 3] = [ShaderKind::Sprite2D, ShaderKind::Model3D, ShaderKind::Text];

    pub fn label(self) -> &'static str {
        match self {
            ShaderKind::Sprite2D => "shader-2d",
            ShaderKind::Model3D => "shader-3d",
            ShaderKind::Text => "shader-text",
        }
    }

    fn source(self) -> &'static str {
        match self {
            ShaderKind::Sprite2D => SHADER_2D,
            ShaderKind::Model3D => SHADER_3D,
            ShaderKind::Text => SHADER_TEXT,
        }
    }

    /// Positions live in buffer slot 0 and texture coordinates in slot 1.
    fn vertex_buffers(self) -> [wgpu::VertexBufferLayout<'static>; 2] {
        let (components, attributes) = match self {
            ShaderKind::Model3D => (3, POSITION_3D),
            ShaderKind::Sprite2D | ShaderKind::Text => (2, POSITION_2D),
        };
        let float = std::mem::size_of::<f32>() as u64;
        [
            wgpu::VertexBufferLayout {
                array_stride: components * float,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            },
            wgpu::VertexBufferLayout {
                array_stride: 2 * float,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: TEX_COORD,
            },
        ]
    }
}

/// A compiled shader module.
#[derive(Debug)]
pub struct Shader {
    kind: ShaderKind,
    module: wgpu::ShaderModule,
}

impl Shader {
    pub fn new(device: &wgpu::Device, kind: ShaderKind) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(kind.source().into()),
        });
        Self { kind, module }
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    /// Builds the pipeline for the given target format and render state.
    ///
    /// Without depth testing the depth buffer is still attached but every
    /// fragment passes and nothing is written.
    pub fn create_pipeline(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        key: PipelineKey,
    ) -> wgpu::RenderPipeline {
        let buffers = self.kind.vertex_buffers();
        let (depth_write_enabled, depth_compare) = if key.depth_test {
            (true, wgpu::CompareFunction::Less)
        } else {
            (false, wgpu::CompareFunction::Always)
        };
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.kind.label()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &self.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled,
                depth_compare,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: key
                        .alpha_blending
                        .then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        })
    }
}

const SHADER_2D: &str = r#"
struct Uniforms {
    transform: mat3x3<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(1) @binding(0)
var tex: texture_2d<f32>;
@group(1) @binding(1)
var tex_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@location(0) vertex: vec2<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    let position = uniforms.transform * vec3<f32>(vertex, 1.0);
    out.position = vec4<f32>(position.xy, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(tex, tex_sampler, input.tex_coord);
}
"#;

const SHADER_3D: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(1) @binding(0)
var tex: texture_2d<f32>;
@group(1) @binding(1)
var tex_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@location(0) vertex: vec3<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = uniforms.view_proj * uniforms.model * vec4<f32>(vertex, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(tex, tex_sampler, input.tex_coord);
}
"#;

const SHADER_TEXT: &str = r#"
struct Uniforms {
    transform: mat3x3<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(1) @binding(0)
var tex: texture_2d<f32>;
@group(1) @binding(1)
var tex_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@location(0) vertex: vec2<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    let position = uniforms.transform * vec3<f32>(vertex, 1.0);
    out.position = vec4<f32>(position.xy, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(tex, tex_sampler, input.tex_coord) * uniforms.color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_shader_reads_vec3_positions() {
        let buffers = ShaderKind::Model3D.vertex_buffers();
        assert_eq!(buffers[0].array_stride, 12);
        assert_eq!(buffers[1].array_stride, 8);
        let buffers = ShaderKind::Text.vertex_buffers();
        assert_eq!(buffers[0].array_stride, 8);
    }

    #[test]
    fn every_shader_declares_both_entry_points() {
        for kind in ShaderKind::ALL {
            let source = kind.source();
            assert!(source.contains("fn vs_main"), "{}", kind.label());
            assert!(source.contains("fn fs_main"), "{}", kind.label());
        }
    }

    #[test]
    fn only_text_shader_applies_color() {
        assert!(SHADER_TEXT.contains("* uniforms.color"));
        assert!(!SHADER_2D.contains("* uniforms.color"));
    }
}

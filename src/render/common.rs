use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};
use serde::{Deserialize, Serialize};

/// Frame wide render state: clearing, blending and depth testing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub clear_color: Vec4,
    pub clear_color_buffer: bool,
    pub clear_depth_buffer: bool,
    pub alpha_blending: bool,
    pub depth_test: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: Vec4::ZERO,
            clear_color_buffer: true,
            clear_depth_buffer: false,
            alpha_blending: true,
            depth_test: false,
        }
    }
}

impl RenderSettings {
    pub(crate) fn clear_color_wgpu(&self) -> wgpu::Color {
        wgpu::Color {
            r: self.clear_color.x as f64,
            g: self.clear_color.y as f64,
            b: self.clear_color.z as f64,
            a: self.clear_color.w as f64,
        }
    }
}

/// Everything a pipeline depends on besides its shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub format: wgpu::TextureFormat,
    pub depth_test: bool,
    pub alpha_blending: bool,
}

impl PipelineKey {
    pub fn new(format: wgpu::TextureFormat, settings: &RenderSettings) -> Self {
        Self {
            format,
            depth_test: settings.depth_test,
            alpha_blending: settings.alpha_blending,
        }
    }
}

/// Uniforms of the 2D and text shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Uniform2D {
    transform: [[f32; 4]; 3],
    color: [f32; 4],
}

impl Uniform2D {
    pub fn new(transform: Mat3, color: Vec4) -> Self {
        Self {
            transform: mat3_to_3x4(transform),
            color: color.to_array(),
        }
    }
}

/// Uniforms of the 3D shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Uniform3D {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

impl Uniform3D {
    pub fn new(view_proj: Mat4, model: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
        }
    }
}

// WGSL pads every mat3x3 column to 16 bytes.
fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn uniform_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<Uniform2D>(), 64);
        assert_eq!(std::mem::size_of::<Uniform3D>(), 128);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let uniform = Uniform2D::new(Mat3::from_translation(Vec2::new(3.0, 4.0)), Vec4::ONE);
        assert_eq!(uniform.transform[2], [3.0, 4.0, 1.0, 0.0]);
        assert_eq!(uniform.transform[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn defaults_clear_color_and_blend() {
        let settings = RenderSettings::default();
        assert!(settings.clear_color_buffer);
        assert!(settings.alpha_blending);
        assert!(!settings.depth_test);
        assert!(!settings.clear_depth_buffer);
    }
}

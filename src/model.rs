//! Textured meshes in 3D.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use glam::Mat4;
use log::debug;

use crate::actor::{shared, Actor, ActorId, Shared};
use crate::camera::Camera;
use crate::mesh::{Mesh, MeshId};
use crate::pos::Pos3D;
use crate::render::{DrawCall, Frame, GpuBuffer, ShaderKind, Uniform3D};
use crate::system::System;
use crate::texture::Texture;

pub const MODEL_RENDERER_NAME: &str = "modelRenderer";

/// An actor with a 3D position, a texture and a mesh.
pub struct Model {
    id: ActorId,
    pub pos: Shared<Pos3D>,
    pub texture: Arc<Texture>,
    pub mesh: Arc<Mesh>,
}

impl Model {
    pub fn new(mesh: Arc<Mesh>, texture: Arc<Texture>) -> Self {
        Self {
            id: ActorId::next(),
            pos: shared(Pos3D::default()),
            texture,
            mesh,
        }
    }
}

impl Actor for Model {
    fn id(&self) -> ActorId {
        self.id
    }

    fn pos_3d(&self) -> Option<Shared<Pos3D>> {
        Some(self.pos.clone())
    }

    fn texture(&self) -> Option<Arc<Texture>> {
        Some(self.texture.clone())
    }

    fn mesh(&self) -> Option<Arc<Mesh>> {
        Some(self.mesh.clone())
    }
}

struct ModelEntry {
    id: ActorId,
    pos: Shared<Pos3D>,
    texture: Arc<Texture>,
    mesh: Arc<Mesh>,
}

struct MeshBuffers {
    indices: GpuBuffer,
    vertices: GpuBuffer,
    tex_coords: GpuBuffer,
}

impl MeshBuffers {
    fn new(device: &wgpu::Device, mesh: &Mesh) -> Self {
        Self {
            indices: GpuBuffer::index(device, "mesh-indices", &mesh.indices),
            vertices: GpuBuffer::vertex(device, "mesh-vertices", &mesh.vertices),
            tex_coords: GpuBuffer::vertex(device, "mesh-tex-coords", &mesh.tex_coords),
        }
    }
}

/// Renders models with a perspective camera, or orthographically when
/// `ortho` is set. `pos` moves every model at once in ortho mode.
pub struct ModelRenderer {
    pub pos: Pos3D,
    camera: Shared<Camera>,
    ortho: bool,
    models: Vec<ModelEntry>,
    mesh_cache: HashMap<MeshId, MeshBuffers>,
}

impl ModelRenderer {
    pub fn new(camera: Shared<Camera>, ortho: bool) -> Self {
        Self {
            pos: Pos3D::default(),
            camera,
            ortho,
            models: Vec::new(),
            mesh_cache: HashMap::new(),
        }
    }

    pub fn camera(&self) -> Shared<Camera> {
        self.camera.clone()
    }

    pub fn set_camera(&mut self, camera: Shared<Camera>) {
        self.camera = camera;
    }

    pub fn is_ortho(&self) -> bool {
        self.ortho
    }

    pub fn set_ortho(&mut self, ortho: bool) {
        self.ortho = ortho;
    }

    pub fn add(
        &mut self,
        id: ActorId,
        pos: Shared<Pos3D>,
        texture: Arc<Texture>,
        mesh: Arc<Mesh>,
    ) -> bool {
        if self.models.iter().any(|model| model.id == id) {
            return false;
        }
        self.models.push(ModelEntry {
            id,
            pos,
            texture,
            mesh,
        });
        true
    }

    pub fn add_model(&mut self, model: &Model) -> bool {
        self.add(
            model.id,
            model.pos.clone(),
            model.texture.clone(),
            model.mesh.clone(),
        )
    }

    /// Projection times view, or the 3D ortho projection times the group
    /// transform in ortho mode.
    pub fn projection_view(&self) -> Mat4 {
        let camera = self.camera.read();
        if self.ortho {
            camera.ortho_3d() * self.pos.model()
        } else {
            camera.projection() * camera.view()
        }
    }

    fn prune_mesh_cache(&mut self) {
        let models = &self.models;
        self.mesh_cache
            .retain(|id, _| models.iter().any(|model| model.mesh.id() == *id));
    }
}

impl System for ModelRenderer {
    fn name(&self) -> &str {
        MODEL_RENDERER_NAME
    }

    fn render(&mut self, frame: &mut Frame<'_, '_>) -> Result<()> {
        let projection_view = self.projection_view();
        for model in &self.models {
            let transform = {
                let pos = model.pos.read();
                if !pos.visible {
                    continue;
                }
                pos.model()
            };
            let buffers = self.mesh_cache.entry(model.mesh.id()).or_insert_with(|| {
                debug!(
                    "uploading mesh {:?} with {} vertices",
                    model.mesh.id(),
                    model.mesh.vertex_count()
                );
                MeshBuffers::new(&frame.gpu().device, &model.mesh)
            });
            let uniforms = Uniform3D::new(projection_view, transform);
            frame.draw(DrawCall {
                shader: ShaderKind::Model3D,
                uniforms: &uniforms,
                texture: &model.texture,
                positions: &buffers.vertices,
                tex_coords: &buffers.tex_coords,
                indices: &buffers.indices,
            })?;
        }
        Ok(())
    }

    /// Accepts actors with a 3D position, a texture and a mesh.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        match (actor.pos_3d(), actor.texture(), actor.mesh()) {
            (Some(pos), Some(texture), Some(mesh)) => self.add(actor.id(), pos, texture, mesh),
            _ => false,
        }
    }

    fn remove_by_id(&mut self, id: ActorId) -> bool {
        let before = self.models.len();
        self.models.retain(|model| model.id != id);
        let removed = before != self.models.len();
        if removed {
            self.prune_mesh_cache();
        }
        removed
    }

    fn remove_all(&mut self) {
        self.models.clear();
        self.mesh_cache.clear();
    }

    fn len(&self) -> usize {
        self.models.len()
    }

    fn cleanup(&mut self) {
        self.mesh_cache.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};
    use image::RgbaImage;

    use super::*;
    use crate::math::Viewport;
    use crate::texture::TextureFilter;

    fn model() -> Model {
        let mesh = Arc::new(Mesh::new(
            vec![0, 1, 2],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            vec![0.0; 6],
        ));
        let texture = Arc::new(Texture::from_rgba(
            RgbaImage::new(1, 1),
            TextureFilter::Linear,
            false,
        ));
        Model::new(mesh, texture)
    }

    fn camera() -> Shared<Camera> {
        shared(Camera::new(Viewport::new(0.0, 0.0, 600.0, 400.0)))
    }

    #[test]
    fn accepts_models_once() {
        let mut renderer = ModelRenderer::new(camera(), false);
        let model = model();
        assert!(renderer.add_actor(&model));
        assert!(!renderer.add_model(&model));
        assert_eq!(renderer.len(), 1);
        assert!(renderer.remove_by_id(model.id()));
        assert!(renderer.is_empty());
    }

    #[test]
    fn sprites_are_not_models() {
        let mut renderer = ModelRenderer::new(camera(), false);
        let texture = Arc::new(Texture::from_rgba(
            RgbaImage::new(1, 1),
            TextureFilter::Linear,
            false,
        ));
        let sprite = crate::sprite::Sprite::new(texture);
        assert!(!renderer.add_actor(&sprite));
    }

    #[test]
    fn perspective_puts_origin_in_front_of_camera() {
        let renderer = ModelRenderer::new(camera(), false);
        let clip = renderer.projection_view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn ortho_mode_uses_group_transform() {
        let mut renderer = ModelRenderer::new(camera(), true);
        renderer.pos.pos = Vec3::new(600.0, 400.0, 0.0);
        let moved = renderer.projection_view().project_point3(Vec3::ZERO);
        assert!((moved.x - 1.0).abs() < 1e-5);
        assert!((moved.y - 1.0).abs() < 1e-5);
        assert!(renderer.is_ortho());
    }
}

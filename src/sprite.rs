//! Textured quads in 2D.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use glam::{Mat3, Vec4};

use crate::actor::{shared, Actor, ActorId, Shared};
use crate::camera::Camera;
use crate::pos::Pos2D;
use crate::render::{DrawCall, Frame, GpuBuffer, ShaderKind, Uniform2D};
use crate::system::System;
use crate::texture::Texture;

pub const SPRITE_RENDERER_NAME: &str = "spriteRenderer";

/// Unit quad from (0, 0) to (1, 1) as two triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectMesh {
    pub indices: [u32; 6],
    pub vertices: [f32; 8],
    pub tex_coords: [f32; 8],
}

/// Builds the unit quad. `flip` mirrors the texture vertically, which is
/// what offscreen render targets need.
pub fn rect_mesh(flip: bool) -> RectMesh {
    let tex_coords = if flip {
        [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]
    } else {
        [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
    };
    RectMesh {
        indices: [0, 1, 2, 1, 2, 3],
        vertices: [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        tex_coords,
    }
}

/// GPU copy of a [`RectMesh`].
pub(crate) struct QuadBuffers {
    pub indices: GpuBuffer,
    pub vertices: GpuBuffer,
    pub tex_coords: GpuBuffer,
}

impl QuadBuffers {
    pub fn new(device: &wgpu::Device, mesh: &RectMesh) -> Self {
        Self {
            indices: GpuBuffer::index(device, "quad-indices", &mesh.indices),
            vertices: GpuBuffer::vertex(device, "quad-vertices", &mesh.vertices),
            tex_coords: GpuBuffer::vertex(device, "quad-tex-coords", &mesh.tex_coords),
        }
    }
}

/// An actor with a 2D position and a texture. Its size starts out as the
/// texture size in pixels.
pub struct Sprite {
    id: ActorId,
    pub pos: Shared<Pos2D>,
    pub texture: Arc<Texture>,
}

impl Sprite {
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            id: ActorId::next(),
            pos: shared(Pos2D::with_size(texture.size())),
            texture,
        }
    }
}

impl Actor for Sprite {
    fn id(&self) -> ActorId {
        self.id
    }

    fn pos_2d(&self) -> Option<Shared<Pos2D>> {
        Some(self.pos.clone())
    }

    fn texture(&self) -> Option<Arc<Texture>> {
        Some(self.texture.clone())
    }
}

struct SpriteEntry {
    id: ActorId,
    pos: Shared<Pos2D>,
    texture: Arc<Texture>,
}

/// Renders sprites. `pos` moves every sprite at once.
pub struct SpriteRenderer {
    pub pos: Pos2D,
    camera: Shared<Camera>,
    flip: bool,
    sprites: Vec<SpriteEntry>,
    quad: Option<QuadBuffers>,
}

impl SpriteRenderer {
    pub fn new(camera: Shared<Camera>, flip: bool) -> Self {
        Self {
            pos: Pos2D::default(),
            camera,
            flip,
            sprites: Vec::new(),
            quad: None,
        }
    }

    pub fn camera(&self) -> Shared<Camera> {
        self.camera.clone()
    }

    pub fn set_camera(&mut self, camera: Shared<Camera>) {
        self.camera = camera;
    }

    /// Adds a sprite. Returns false if the id is already present.
    pub fn add(&mut self, id: ActorId, pos: Shared<Pos2D>, texture: Arc<Texture>) -> bool {
        if self.contains(id) {
            return false;
        }
        self.sprites.push(SpriteEntry { id, pos, texture });
        true
    }

    pub fn add_sprite(&mut self, sprite: &Sprite) -> bool {
        self.add(sprite.id, sprite.pos.clone(), sprite.texture.clone())
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.sprites.iter().any(|sprite| sprite.id == id)
    }

    /// Projection times the group transform.
    pub fn transform(&self) -> Mat3 {
        self.camera.read().ortho() * self.pos.model()
    }
}

impl System for SpriteRenderer {
    fn name(&self) -> &str {
        SPRITE_RENDERER_NAME
    }

    fn render(&mut self, frame: &mut Frame<'_, '_>) -> Result<()> {
        if self.sprites.is_empty() {
            return Ok(());
        }
        let transform = self.transform();
        let flip = self.flip;
        let quad = self
            .quad
            .get_or_insert_with(|| QuadBuffers::new(&frame.gpu().device, &rect_mesh(flip)));

        for sprite in &self.sprites {
            let model = {
                let pos = sprite.pos.read();
                if !pos.visible {
                    continue;
                }
                pos.model()
            };
            let uniforms = Uniform2D::new(transform * model, Vec4::ONE);
            frame.draw(DrawCall {
                shader: ShaderKind::Sprite2D,
                uniforms: &uniforms,
                texture: &sprite.texture,
                positions: &quad.vertices,
                tex_coords: &quad.tex_coords,
                indices: &quad.indices,
            })?;
        }
        Ok(())
    }

    /// Accepts actors with a 2D position and a texture but no keyframes.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        if actor.keyframes().is_some() {
            return false;
        }
        match (actor.pos_2d(), actor.texture()) {
            (Some(pos), Some(texture)) => self.add(actor.id(), pos, texture),
            _ => false,
        }
    }

    fn remove_by_id(&mut self, id: ActorId) -> bool {
        let before = self.sprites.len();
        self.sprites.retain(|sprite| sprite.id != id);
        before != self.sprites.len()
    }

    fn remove_all(&mut self) {
        self.sprites.clear();
    }

    fn len(&self) -> usize {
        self.sprites.len()
    }

    fn cleanup(&mut self) {
        self.quad = None;
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
    use glam::Vec2;
    use image::RgbaImage;

    use super::*;
    use crate::math::Viewport;
    use crate::texture::TextureFilter;

    fn texture(width: u32, height: u32) -> Arc<Texture> {
        Arc::new(Texture::from_rgba(
            RgbaImage::new(width, height),
            TextureFilter::Linear,
            false,
        ))
    }

    fn renderer() -> SpriteRenderer {
        let camera = shared(Camera::new(Viewport::new(0.0, 0.0, 600.0, 400.0)));
        SpriteRenderer::new(camera, false)
    }

    #[test]
    fn rect_mesh_flip_mirrors_t() {
        let plain = rect_mesh(false);
        let flipped = rect_mesh(true);
        assert_eq!(plain.indices, flipped.indices);
        assert_eq!(plain.vertices, flipped.vertices);
        for i in (0..8).step_by(2) {
            assert_eq!(plain.tex_coords[i], flipped.tex_coords[i]);
            assert_eq!(plain.tex_coords[i + 1], 1.0 - flipped.tex_coords[i + 1]);
        }
    }

    #[test]
    fn sprite_takes_texture_size() {
        let sprite = Sprite::new(texture(32, 16));
        assert_eq!(sprite.pos.read().size, Vec2::new(32.0, 16.0));
        assert!(sprite.pos.read().visible);
    }

    #[test]
    fn rejects_duplicates_and_removes_by_id() {
        let mut renderer = renderer();
        let sprite = Sprite::new(texture(4, 4));
        assert!(renderer.add_actor(&sprite));
        assert!(!renderer.add_actor(&sprite));
        assert!(!renderer.add_sprite(&sprite));
        assert_eq!(renderer.len(), 1);
        assert!(renderer.remove_by_id(sprite.id()));
        assert!(!renderer.remove_by_id(sprite.id()));
        assert!(renderer.is_empty());
    }

    #[test]
    fn transform_maps_viewport_to_clip_space() {
        let renderer = renderer();
        let corner = renderer.transform().transform_point2(Vec2::new(600.0, 400.0));
        assert!((corner - Vec2::ONE).length() < 1e-5);
    }
}

//! Sprite sheet animation.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use glam::{Mat3, Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::actor::{shared, Actor, ActorId, Shared};
use crate::camera::Camera;
use crate::pos::Pos2D;
use crate::render::{DrawCall, Frame, GpuBuffer, ShaderKind, Uniform2D};
use crate::sprite::{rect_mesh, QuadBuffers};
use crate::system::System;
use crate::texture::Texture;

pub const KEYFRAME_RENDERER_NAME: &str = "keyframeRenderer";

/// Texture coordinate rectangle of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub min: Vec2,
    pub max: Vec2,
}

impl Keyframe {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Texture coordinates for the unit quad, `max.y` on the bottom edge.
    pub fn tex_coords(&self) -> [f32; 8] {
        [
            self.min.x, self.max.y, self.max.x, self.max.y, self.min.x, self.min.y, self.max.x,
            self.min.y,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeSet {
    frames: Vec<Keyframe>,
}

impl KeyframeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame and returns the new length.
    pub fn add(&mut self, frame: Keyframe) -> usize {
        self.frames.push(frame);
        self.frames.len()
    }

    pub fn get(&self, index: usize) -> Option<&Keyframe> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Playback state over the frames `start..=end` of a set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyframeAnimation {
    pub start: usize,
    pub end: usize,
    pub looping: bool,
    /// Frames per second.
    pub speed: f64,
    pub current: usize,
    pub interpolation: f64,
}

impl Default for KeyframeAnimation {
    fn default() -> Self {
        Self::new(0, 0, false, 0.0)
    }
}

impl KeyframeAnimation {
    pub fn new(start: usize, end: usize, looping: bool, speed: f64) -> Self {
        Self {
            start,
            end,
            looping,
            speed,
            current: start,
            interpolation: 0.0,
        }
    }

    /// Advances playback by `delta` seconds, stepping at most one frame.
    pub fn advance(&mut self, delta: f64) {
        self.interpolation += delta * self.speed;
        if self.interpolation <= 1.0 {
            return;
        }
        self.interpolation = 0.0;
        self.current += 1;
        if self.current > self.end {
            self.current = if self.looping { self.start } else { self.end };
        }
    }
}

/// A sprite drawn from one frame of a keyframe set at a time.
pub struct AnimatedSprite {
    id: ActorId,
    pub pos: Shared<Pos2D>,
    pub texture: Arc<Texture>,
    pub keyframes: Shared<KeyframeSet>,
    pub animation: Shared<KeyframeAnimation>,
}

impl AnimatedSprite {
    /// Size is `width` x `height` when both are positive, the texture size
    /// otherwise. The animation starts out still on frame 0.
    pub fn new(texture: Arc<Texture>, keyframes: Shared<KeyframeSet>, width: u32, height: u32) -> Self {
        let size = if width > 0 && height > 0 {
            Vec2::new(width as f32, height as f32)
        } else {
            texture.size()
        };
        Self {
            id: ActorId::next(),
            pos: shared(Pos2D::with_size(size)),
            texture,
            keyframes,
            animation: shared(KeyframeAnimation::default()),
        }
    }
}

impl Actor for AnimatedSprite {
    fn id(&self) -> ActorId {
        self.id
    }

    fn pos_2d(&self) -> Option<Shared<Pos2D>> {
        Some(self.pos.clone())
    }

    fn texture(&self) -> Option<Arc<Texture>> {
        Some(self.texture.clone())
    }

    fn keyframes(&self) -> Option<Shared<KeyframeSet>> {
        Some(self.keyframes.clone())
    }

    fn animation(&self) -> Option<Shared<KeyframeAnimation>> {
        Some(self.animation.clone())
    }
}

struct AnimatedEntry {
    id: ActorId,
    pos: Shared<Pos2D>,
    texture: Arc<Texture>,
    keyframes: Shared<KeyframeSet>,
    animation: Shared<KeyframeAnimation>,
    tex_coords: Option<(Keyframe, GpuBuffer)>,
}

/// Advances and renders animated sprites. `pos` moves all of them at once.
pub struct KeyframeRenderer {
    pub pos: Pos2D,
    camera: Shared<Camera>,
    sprites: Vec<AnimatedEntry>,
    quad: Option<QuadBuffers>,
}

impl KeyframeRenderer {
    pub fn new(camera: Shared<Camera>) -> Self {
        Self {
            pos: Pos2D::default(),
            camera,
            sprites: Vec::new(),
            quad: None,
        }
    }

    pub fn set_camera(&mut self, camera: Shared<Camera>) {
        self.camera = camera;
    }

    pub fn add(
        &mut self,
        id: ActorId,
        pos: Shared<Pos2D>,
        texture: Arc<Texture>,
        keyframes: Shared<KeyframeSet>,
        animation: Shared<KeyframeAnimation>,
    ) -> bool {
        if self.sprites.iter().any(|sprite| sprite.id == id) {
            return false;
        }
        self.sprites.push(AnimatedEntry {
            id,
            pos,
            texture,
            keyframes,
            animation,
            tex_coords: None,
        });
        true
    }

    pub fn add_sprite(&mut self, sprite: &AnimatedSprite) -> bool {
        self.add(
            sprite.id,
            sprite.pos.clone(),
            sprite.texture.clone(),
            sprite.keyframes.clone(),
            sprite.animation.clone(),
        )
    }

    pub fn transform(&self) -> Mat3 {
        self.camera.read().ortho() * self.pos.model()
    }
}

impl System for KeyframeRenderer {
    fn name(&self) -> &str {
        KEYFRAME_RENDERER_NAME
    }

    fn update(&mut self, delta: f64) {
        for sprite in &self.sprites {
            sprite.animation.write().advance(delta);
        }
    }

    fn render(&mut self, frame: &mut Frame<'_, '_>) -> Result<()> {
        if self.sprites.is_empty() {
            return Ok(());
        }
        let transform = self.transform();
        let quad = self
            .quad
            .get_or_insert_with(|| QuadBuffers::new(&frame.gpu().device, &rect_mesh(false)));

        for sprite in &mut self.sprites {
            let model = {
                let pos = sprite.pos.read();
                if !pos.visible {
                    continue;
                }
                pos.model()
            };
            let current = sprite.animation.read().current;
            let Some(keyframe) = sprite.keyframes.read().get(current).copied() else {
                continue;
            };

            let gpu = frame.gpu();
            match &mut sprite.tex_coords {
                Some((shown, _)) if *shown == keyframe => {}
                Some((shown, buffer)) => {
                    buffer.update(&gpu.device, &gpu.queue, &keyframe.tex_coords());
                    *shown = keyframe;
                }
                None => {
                    let buffer =
                        GpuBuffer::vertex(&gpu.device, "keyframe-tex-coords", &keyframe.tex_coords());
                    sprite.tex_coords = Some((keyframe, buffer));
                }
            }
            let Some((_, tex_coords)) = &sprite.tex_coords else {
                continue;
            };

            let uniforms = Uniform2D::new(transform * model, Vec4::ONE);
            frame.draw(DrawCall {
                shader: ShaderKind::Sprite2D,
                uniforms: &uniforms,
                texture: &sprite.texture,
                positions: &quad.vertices,
                tex_coords,
                indices: &quad.indices,
            })?;
        }
        Ok(())
    }

    /// Accepts actors with a position, a texture, keyframes and an animation.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        match (
            actor.pos_2d(),
            actor.texture(),
            actor.keyframes(),
            actor.animation(),
        ) {
            (Some(pos), Some(texture), Some(keyframes), Some(animation)) => {
                self.add(actor.id(), pos, texture, keyframes, animation)
            }
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
        for sprite in &mut self.sprites {
            sprite.tex_coords = None;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

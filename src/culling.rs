use std::any::Any;

use crate::actor::{Actor, ActorId, Shared};
use crate::math::Viewport;
use crate::pos::Pos2D;
use crate::system::System;

pub const CULLING_2D_NAME: &str = "culling2d";

struct Cullable {
    id: ActorId,
    pos: Shared<Pos2D>,
}

/// Hides 2D actors lying completely outside the viewport.
pub struct Culling2D {
    viewport: Viewport,
    cullables: Vec<Cullable>,
}

impl Culling2D {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            cullables: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn add(&mut self, id: ActorId, pos: Shared<Pos2D>) -> bool {
        if self.cullables.iter().any(|cullable| cullable.id == id) {
            return false;
        }
        self.cullables.push(Cullable { id, pos });
        true
    }

    fn outside(&self, pos: &Pos2D) -> bool {
        let size = pos.scaled_size();
        pos.pos.x > self.viewport.right()
            || pos.pos.x + size.x < self.viewport.left()
            || pos.pos.y > self.viewport.top()
            || pos.pos.y + size.y < self.viewport.bottom()
    }
}

impl System for Culling2D {
    fn name(&self) -> &str {
        CULLING_2D_NAME
    }

    fn update(&mut self, _delta: f64) {
        for cullable in &self.cullables {
            let mut pos = cullable.pos.write();
            let hidden = self.outside(&pos);
            pos.visible = !hidden;
        }
    }

    /// Accepts every 2D actor except texts.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        if actor.text().is_some() {
            return false;
        }
        match actor.pos_2d() {
            Some(pos) => self.add(actor.id(), pos),
            None => false,
        }
    }

    fn remove_by_id(&mut self, id: ActorId) -> bool {
        let before = self.cullables.len();
        self.cullables.retain(|cullable| cullable.id != id);
        before != self.cullables.len()
    }

    fn remove_all(&mut self) {
        self.cullables.clear();
    }

    fn len(&self) -> usize {
        self.cullables.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

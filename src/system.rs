//! Systems operate on the actors added to them once per frame.

use std::any::Any;

use anyhow::{anyhow, Result};
use log::debug;

use crate::actor::{Actor, ActorId};
use crate::culling::{Culling2D, CULLING_2D_NAME};
use crate::keyframe::{KeyframeRenderer, KEYFRAME_RENDERER_NAME};
use crate::model::{ModelRenderer, MODEL_RENDERER_NAME};
use crate::render::Frame;
use crate::sprite::{SpriteRenderer, SPRITE_RENDERER_NAME};
use crate::text::{TextRenderer, TEXT_RENDERER_NAME};

/// A named unit of per-frame work over a set of actors.
///
/// `update` advances simulation state and never touches the GPU, so it runs
/// in headless mode as well. `render` records draw calls into the current
/// frame.
pub trait System: Any {
    fn name(&self) -> &str;

    fn update(&mut self, _delta: f64) {}

    fn render(&mut self, _frame: &mut Frame<'_, '_>) -> Result<()> {
        Ok(())
    }

    /// Accepts the actor if it carries the components this system needs.
    fn add_actor(&mut self, actor: &dyn Actor) -> bool;

    fn remove_by_id(&mut self, id: ActorId) -> bool;

    fn remove_all(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases what the system owns. Called when it leaves the registry.
    fn cleanup(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered registry of systems. Update and render follow insertion order.
#[derive(Default)]
pub struct Systems {
    systems: Vec<Box<dyn System>>,
}

impl Systems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system. Returns false if one with the same name exists.
    pub fn add(&mut self, system: Box<dyn System>) -> bool {
        if self.get(system.name()).is_some() {
            return false;
        }
        debug!("added system {}", system.name());
        self.systems.push(system);
        true
    }

    /// Removes the named system after calling its cleanup.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.systems.iter().position(|system| system.name() == name) {
            Some(index) => {
                let mut system = self.systems.remove(index);
                system.cleanup();
                true
            }
            None => false,
        }
    }

    pub fn remove_all(&mut self) {
        for system in self.systems.iter_mut() {
            system.cleanup();
        }
        self.systems.clear();
    }

    pub fn get(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.name() == name)
            .map(|system| system.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        self.systems
            .iter_mut()
            .find(|system| system.name() == name)
            .map(|system| system.as_mut())
    }

    pub fn find<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .find_map(|system| system.as_any().downcast_ref::<S>())
    }

    pub fn find_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .find_map(|system| system.as_any_mut().downcast_mut::<S>())
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|system| system.name())
    }

    pub fn update_all(&mut self, delta: f64) {
        for system in self.systems.iter_mut() {
            system.update(delta);
        }
    }

    pub fn render_all(&mut self, frame: &mut Frame<'_, '_>) -> Result<()> {
        for system in self.systems.iter_mut() {
            system.render(frame)?;
        }
        Ok(())
    }

    /// Offers the actor to every system. True if at least one accepted it.
    pub fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        let mut accepted = false;
        for system in self.systems.iter_mut() {
            if system.add_actor(actor) {
                accepted = true;
            }
        }
        accepted
    }

    /// Removes the actor from every system. True if any system held it.
    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        let mut removed = false;
        for system in self.systems.iter_mut() {
            if system.remove_by_id(id) {
                removed = true;
            }
        }
        removed
    }

    pub fn sprite_renderer(&mut self) -> Result<&mut SpriteRenderer> {
        self.named_mut(SPRITE_RENDERER_NAME, "sprite renderer")
    }

    pub fn model_renderer(&mut self) -> Result<&mut ModelRenderer> {
        self.named_mut(MODEL_RENDERER_NAME, "model renderer")
    }

    pub fn culling_2d(&mut self) -> Result<&mut Culling2D> {
        self.named_mut(CULLING_2D_NAME, "culling system")
    }

    pub fn keyframe_renderer(&mut self) -> Result<&mut KeyframeRenderer> {
        self.named_mut(KEYFRAME_RENDERER_NAME, "keyframe renderer")
    }

    pub fn text_renderer(&mut self) -> Result<&mut TextRenderer> {
        self.named_mut(TEXT_RENDERER_NAME, "text renderer")
    }

    fn named_mut<S: System>(&mut self, name: &str, what: &str) -> Result<&mut S> {
        self.get_mut(name)
            .and_then(|system| system.as_any_mut().downcast_mut::<S>())
            .ok_or_else(|| anyhow!("could not obtain {what}"))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::actor::{shared, Shared};
    use crate::pos::Pos2D;

    struct Counter {
        name: &'static str,
        ids: Vec<ActorId>,
        updates: f64,
        cleaned: Rc<Cell<u32>>,
    }

    impl Counter {
        fn new(name: &'static str, cleaned: Rc<Cell<u32>>) -> Self {
            Self {
                name,
                ids: Vec::new(),
                updates: 0.0,
                cleaned,
            }
        }
    }

    impl System for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, delta: f64) {
            self.updates += delta;
        }

        fn add_actor(&mut self, actor: &dyn Actor) -> bool {
            if actor.pos_2d().is_none() || self.ids.contains(&actor.id()) {
                return false;
            }
            self.ids.push(actor.id());
            true
        }

        fn remove_by_id(&mut self, id: ActorId) -> bool {
            let before = self.ids.len();
            self.ids.retain(|existing| *existing != id);
            before != self.ids.len()
        }

        fn remove_all(&mut self) {
            self.ids.clear();
        }

        fn len(&self) -> usize {
            self.ids.len()
        }

        fn cleanup(&mut self) {
            self.cleaned.set(self.cleaned.get() + 1);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Dot {
        id: ActorId,
        pos: Shared<Pos2D>,
    }

    impl Actor for Dot {
        fn id(&self) -> ActorId {
            self.id
        }

        fn pos_2d(&self) -> Option<Shared<Pos2D>> {
            Some(self.pos.clone())
        }
    }

    #[test]
    fn names_are_unique() {
        let cleaned = Rc::new(Cell::new(0));
        let mut systems = Systems::new();
        assert!(systems.add(Box::new(Counter::new("a", cleaned.clone()))));
        assert!(!systems.add(Box::new(Counter::new("a", cleaned.clone()))));
        assert!(systems.add(Box::new(Counter::new("b", cleaned))));
        assert_eq!(systems.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn remove_calls_cleanup() {
        let cleaned = Rc::new(Cell::new(0));
        let mut systems = Systems::new();
        systems.add(Box::new(Counter::new("a", cleaned.clone())));
        systems.add(Box::new(Counter::new("b", cleaned.clone())));
        systems.add(Box::new(Counter::new("c", cleaned.clone())));
        assert!(systems.remove("a"));
        assert!(!systems.remove("a"));
        assert_eq!(cleaned.get(), 1);
        systems.remove_all();
        assert_eq!(cleaned.get(), 3);
        assert!(systems.is_empty());
    }

    #[test]
    fn actors_are_offered_to_every_system() {
        let cleaned = Rc::new(Cell::new(0));
        let mut systems = Systems::new();
        systems.add(Box::new(Counter::new("a", cleaned.clone())));
        systems.add(Box::new(Counter::new("b", cleaned)));
        let dot = Dot {
            id: ActorId::next(),
            pos: shared(Pos2D::default()),
        };
        assert!(systems.add_actor(&dot));
        assert!(!systems.add_actor(&dot));
        assert_eq!(systems.get("b").map(|s| s.len()), Some(1));
        assert!(systems.remove_actor(dot.id));
        assert!(!systems.remove_actor(dot.id));
    }

    #[test]
    fn update_reaches_all_systems_and_typed_lookup_works() {
        let cleaned = Rc::new(Cell::new(0));
        let mut systems = Systems::new();
        systems.add(Box::new(Counter::new("a", cleaned)));
        systems.update_all(0.5);
        systems.update_all(0.25);
        assert_eq!(systems.find::<Counter>().map(|c| c.updates), Some(0.75));
        assert!(systems.find_mut::<Counter>().is_some());
        let err = match systems.sprite_renderer() {
            Ok(_) => panic!("sprite renderer was never registered"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "could not obtain sprite renderer");
    }
}

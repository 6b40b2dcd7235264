use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::keyframe::{KeyframeAnimation, KeyframeSet};
use crate::mesh::Mesh;
use crate::pos::{Pos2D, Pos3D};
use crate::text::TextComponent;
use crate::texture::Texture;

/// Component handle shared between an actor and the systems it is added to.
pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process wide unique actor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(u64);

impl ActorId {
    pub fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entity made of components.
///
/// Systems inspect the components an actor exposes and accept it when
/// everything they need is present. Every accessor except [`Actor::id`]
/// defaults to `None`.
pub trait Actor {
    fn id(&self) -> ActorId;

    fn pos_2d(&self) -> Option<Shared<Pos2D>> {
        None
    }

    fn pos_3d(&self) -> Option<Shared<Pos3D>> {
        None
    }

    fn texture(&self) -> Option<Arc<Texture>> {
        None
    }

    fn mesh(&self) -> Option<Arc<Mesh>> {
        None
    }

    fn keyframes(&self) -> Option<Shared<KeyframeSet>> {
        None
    }

    fn animation(&self) -> Option<Shared<KeyframeAnimation>> {
        None
    }

    fn text(&self) -> Option<Shared<TextComponent>> {
        None
    }
}

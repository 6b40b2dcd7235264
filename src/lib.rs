//! A small 2D/3D game engine scaffold.
//!
//! Games are made of actors that carry optional components (a 2D or 3D
//! position, a texture, a mesh, keyframes, a text). Systems pick the actors
//! they can handle and update or render them each frame. Resources are
//! loaded through pluggable loaders keyed by file extension, and scenes and
//! input listeners are kept in their own registries owned by the [`Engine`].
//!
//! The frame loop runs either inside a window ([`app::run`]) or headless
//! ([`run_headless`]), which keeps everything but the GPU work testable.

pub mod actor;
pub mod app;
pub mod camera;
pub mod culling;
pub mod game;
pub mod input;
pub mod keyframe;
pub mod loader;
pub mod math;
pub mod mesh;
pub mod model;
pub mod pos;
pub mod render;
pub mod resource;
pub mod scene;
pub mod sprite;
pub mod system;
pub mod text;
pub mod texture;

pub use actor::{shared, Actor, ActorId, Shared};
pub use app::{run, WindowInitError};
pub use camera::Camera;
pub use culling::Culling2D;
pub use game::{run_headless, Engine, Game, RunOptions, Stopper};
pub use input::{Action, Input, InputState, KeyCode, KeyboardListener, Modifiers, MouseButton, MouseListener, NamedKey};
pub use keyframe::{AnimatedSprite, Keyframe, KeyframeAnimation, KeyframeRenderer, KeyframeSet};
pub use loader::{PlyLoader, PngLoader};
pub use math::Viewport;
pub use mesh::Mesh;
pub use model::{Model, ModelRenderer};
pub use pos::{Pos2D, Pos3D};
pub use render::{RenderSettings, RenderTarget};
pub use resource::{Resource, ResourceError, ResourceLoader, Resources};
pub use scene::{Scene, Scenes};
pub use sprite::{Sprite, SpriteRenderer};
pub use system::{System, Systems};
pub use text::{Font, Text, TextRenderer};
pub use texture::{Texture, TextureFilter};

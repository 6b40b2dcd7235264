//! Engine state and the frame loop shared by windowed and headless runs.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec4;
use log::info;
use serde::{Deserialize, Serialize};

use crate::actor::{shared, Actor, ActorId, Shared};
use crate::camera::Camera;
use crate::culling::Culling2D;
use crate::input::Input;
use crate::keyframe::KeyframeRenderer;
use crate::loader::{PlyLoader, PngLoader};
use crate::math::Viewport;
use crate::model::ModelRenderer;
use crate::render::{self, GpuContext, RenderSettings, RenderTarget};
use crate::resource::Resources;
use crate::scene::Scenes;
use crate::sprite::SpriteRenderer;
use crate::system::Systems;
use crate::text::TextRenderer;

pub const DEFAULT_WIDTH: u32 = 600;
pub const DEFAULT_HEIGHT: u32 = 400;
pub const DEFAULT_TITLE: &str = "Game";

/// Fixed step used when running without a window.
pub const HEADLESS_DELTA: f64 = 1.0 / 60.0;

/// Startup parameters. Zero sizes and an empty title fall back to the
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: Vec4,
    pub resizable: bool,
    pub fullscreen: bool,
    pub set_viewport_on_resize: bool,
    pub exit_on_close: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            clear_color: Vec4::ZERO,
            resizable: true,
            fullscreen: false,
            set_viewport_on_resize: true,
            exit_on_close: true,
        }
    }
}

impl RunOptions {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read options {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse options {}", path.display()))
    }

    fn normalized(mut self) -> Self {
        if self.width == 0 {
            self.width = DEFAULT_WIDTH;
        }
        if self.height == 0 {
            self.height = DEFAULT_HEIGHT;
        }
        if self.title.is_empty() {
            self.title = DEFAULT_TITLE.to_string();
        }
        self
    }
}

/// Callbacks of a game driven by the engine.
///
/// Game logic belongs into systems. `update` is meant for switching scenes
/// or ending the game.
pub trait Game {
    /// Called once before the first frame.
    fn setup(&mut self, engine: &mut Engine) -> Result<()>;

    fn update(&mut self, _engine: &mut Engine, _delta: f64) {}

    fn resize(&mut self, _engine: &mut Engine, _width: u32, _height: u32) {}
}

/// Ends the main loop from wherever it is held, for example an input
/// listener.
#[derive(Debug, Clone)]
pub struct Stopper(Arc<AtomicBool>);

impl Stopper {
    pub fn stop(&self) {
        if self.0.swap(false, Ordering::SeqCst) {
            info!("Stopping main loop");
        }
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a running game owns: registries, the default camera and
/// render settings.
pub struct Engine {
    pub systems: Systems,
    pub scenes: Scenes,
    pub resources: Resources,
    pub input: Input,
    pub settings: RenderSettings,
    camera: Shared<Camera>,
    viewport: Viewport,
    running: Arc<AtomicBool>,
    gpu: Option<Arc<GpuContext>>,
    options: RunOptions,
}

impl Engine {
    /// Creates the engine with the PNG and PLY loaders and the sprite,
    /// model, culling, keyframe and text systems registered. All renderers
    /// share the default camera.
    pub fn new(options: RunOptions) -> Self {
        let options = options.normalized();
        let viewport = Viewport::new(0.0, 0.0, options.width as f32, options.height as f32);
        let camera = shared(Camera::new(viewport));

        let mut resources = Resources::new();
        resources.add_loader(Box::new(PngLoader::default()));
        resources.add_loader(Box::new(PlyLoader));

        let mut systems = Systems::new();
        systems.add(Box::new(SpriteRenderer::new(camera.clone(), false)));
        systems.add(Box::new(ModelRenderer::new(camera.clone(), false)));
        systems.add(Box::new(Culling2D::new(viewport)));
        systems.add(Box::new(KeyframeRenderer::new(camera.clone())));
        systems.add(Box::new(TextRenderer::new(camera.clone(), None)));

        let settings = RenderSettings {
            clear_color: options.clear_color,
            ..RenderSettings::default()
        };

        let mut engine = Self {
            systems,
            scenes: Scenes::new(),
            resources,
            input: Input::new(),
            settings,
            camera,
            viewport,
            running: Arc::new(AtomicBool::new(true)),
            gpu: None,
            options,
        };
        engine.set_viewport(viewport);
        engine
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// The camera every default renderer uses.
    pub fn camera(&self) -> Shared<Camera> {
        self.camera.clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn width(&self) -> u32 {
        self.viewport.width as u32
    }

    pub fn height(&self) -> u32 {
        self.viewport.height as u32
    }

    /// Updates the default camera, the culling bounds and the height used
    /// to flip mouse positions.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        {
            let mut camera = self.camera.write();
            camera.set_viewport(viewport);
            camera.calc_ratio();
        }
        if let Ok(culling) = self.systems.culling_2d() {
            culling.set_viewport(viewport);
        }
        self.input.set_viewport_height(viewport.height as f64);
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.settings.clear_color = color;
    }

    /// Offers the actor to every system.
    pub fn add_actor(&mut self, actor: &dyn Actor) -> bool {
        self.systems.add_actor(actor)
    }

    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        self.systems.remove_actor(id)
    }

    /// Advances one frame. Non finite deltas are skipped entirely.
    pub fn step<G: Game + ?Sized>(&mut self, game: &mut G, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        self.systems.update_all(delta);
        game.update(self, delta);
    }

    pub fn handle_resize<G: Game + ?Sized>(&mut self, game: &mut G, width: u32, height: u32) {
        if self.options.set_viewport_on_resize {
            self.set_viewport(Viewport::new(0.0, 0.0, width as f32, height as f32));
        }
        if let Some(scene) = self.scenes.active_mut() {
            scene.resize(width, height);
        }
        game.resize(self, width, height);
    }

    pub fn stop(&self) {
        self.stopper().stop();
    }

    pub fn stopper(&self) -> Stopper {
        Stopper(Arc::clone(&self.running))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn attach_gpu(&mut self, gpu: Arc<GpuContext>) {
        self.gpu = Some(gpu);
    }

    pub fn gpu(&self) -> Option<&Arc<GpuContext>> {
        self.gpu.as_ref()
    }

    /// Renders every system into `target` instead of the window. Returns
    /// the number of draw calls.
    pub fn render_to_target(&mut self, target: &RenderTarget) -> Result<usize> {
        let gpu = self.require_gpu()?;
        render::render_systems(
            &gpu,
            target.color_view(),
            target.depth_view(),
            RenderTarget::FORMAT,
            &self.settings,
            &mut self.systems,
        )
    }

    fn require_gpu(&self) -> Result<Arc<GpuContext>> {
        self.gpu
            .clone()
            .ok_or_else(|| anyhow!("cannot render without a GPU context"))
    }

    /// Cleans up systems and scenes and drops every resource.
    pub fn shutdown(&mut self) {
        info!("Cleaning up {} resources", self.resources.len());
        self.resources.remove_all();
        info!("Cleaning up {} systems", self.systems.len());
        self.systems.remove_all();
        info!("Cleaning up {} scenes", self.scenes.len());
        self.scenes.remove_all();
        if let Some(gpu) = self.gpu.take() {
            let released = gpu.release_all_textures();
            info!("Released {released} GPU textures");
        }
    }
}

/// Runs `frames` frames without a window, each advancing by
/// [`HEADLESS_DELTA`]. Returns the number of frames that ran before the
/// game stopped.
pub fn run_headless<G: Game + ?Sized>(game: &mut G, options: RunOptions, frames: u32) -> Result<u32> {
    info!("Initializing engine without a window");
    let mut engine = Engine::new(options);
    game.setup(&mut engine).context("game setup failed")?;

    info!("Starting main loop");
    let mut ran = 0;
    while ran < frames && engine.is_running() {
        engine.step(game, HEADLESS_DELTA);
        ran += 1;
    }
    engine.shutdown();
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec2;
    use image::RgbaImage;

    use super::*;
    use crate::pos::Pos2D;
    use crate::scene::Scene;
    use crate::sprite::Sprite;
    use crate::texture::{Texture, TextureFilter};

    #[derive(Default)]
    struct Recorder {
        updates: Vec<f64>,
        resizes: Vec<(u32, u32)>,
        stop_after: Option<usize>,
        sprite: Option<Shared<Pos2D>>,
    }

    impl Game for Recorder {
        fn setup(&mut self, engine: &mut Engine) -> Result<()> {
            let texture = Arc::new(Texture::from_rgba(
                RgbaImage::new(10, 10),
                TextureFilter::Linear,
                false,
            ));
            let sprite = Sprite::new(texture);
            sprite.pos.write().pos = Vec2::new(1000.0, 1000.0);
            assert!(engine.add_actor(&sprite));
            self.sprite = Some(sprite.pos.clone());
            Ok(())
        }

        fn update(&mut self, engine: &mut Engine, delta: f64) {
            self.updates.push(delta);
            if Some(self.updates.len()) == self.stop_after {
                engine.stop();
            }
        }

        fn resize(&mut self, _engine: &mut Engine, width: u32, height: u32) {
            self.resizes.push((width, height));
        }
    }

    struct Level(Rc<RefCell<Vec<(u32, u32)>>>);

    impl Scene for Level {
        fn name(&self) -> &str {
            "level"
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.0.borrow_mut().push((width, height));
        }
    }

    #[test]
    fn defaults_register_loaders_and_systems() {
        let mut engine = Engine::new(RunOptions::default());
        assert_eq!(
            engine.systems.names().collect::<Vec<_>>(),
            vec![
                "spriteRenderer",
                "modelRenderer",
                "culling2d",
                "keyframeRenderer",
                "textRenderer"
            ]
        );
        assert!(engine.resources.loader_by_ext("png").is_some());
        assert!(engine.resources.loader_by_ext("ply").is_some());
        assert_eq!((engine.width(), engine.height()), (600, 400));
        assert_eq!(engine.camera().read().ratio, 1.5);
        assert!(engine.systems.text_renderer().is_ok());
    }

    #[test]
    fn zero_sizes_fall_back_to_defaults() {
        let options = RunOptions {
            width: 0,
            title: String::new(),
            ..RunOptions::default()
        };
        let engine = Engine::new(options);
        assert_eq!(engine.width(), DEFAULT_WIDTH);
        assert_eq!(engine.options().title, DEFAULT_TITLE);
    }

    #[test]
    fn step_skips_non_finite_deltas() {
        let mut engine = Engine::new(RunOptions::default());
        let mut game = Recorder::default();
        engine.step(&mut game, f64::INFINITY);
        engine.step(&mut game, f64::NAN);
        engine.step(&mut game, 0.5);
        assert_eq!(game.updates, vec![0.5]);
    }

    #[test]
    fn systems_update_before_the_game() {
        let mut engine = Engine::new(RunOptions::default());
        let mut game = Recorder::default();
        game.setup(&mut engine).unwrap();
        let sprite = game.sprite.clone().unwrap();
        assert!(sprite.read().visible);
        engine.step(&mut game, 0.1);
        assert!(!sprite.read().visible);
    }

    #[test]
    fn resize_updates_viewport_scene_and_game() {
        let mut engine = Engine::new(RunOptions::default());
        let sizes = Rc::new(RefCell::new(Vec::new()));
        engine.scenes.add(Box::new(Level(sizes.clone())));
        engine.scenes.switch("level");
        let mut game = Recorder::default();

        engine.handle_resize(&mut game, 800, 200);
        assert_eq!(engine.camera().read().ratio, 4.0);
        assert_eq!(engine.systems.culling_2d().unwrap().viewport().width, 800.0);
        assert_eq!(*sizes.borrow(), vec![(800, 200)]);
        assert_eq!(game.resizes, vec![(800, 200)]);
    }

    #[test]
    fn resize_keeps_viewport_when_disabled() {
        let options = RunOptions {
            set_viewport_on_resize: false,
            ..RunOptions::default()
        };
        let mut engine = Engine::new(options);
        let mut game = Recorder::default();
        engine.handle_resize(&mut game, 800, 200);
        assert_eq!(engine.width(), 600);
        assert_eq!(game.resizes, vec![(800, 200)]);
    }

    #[test]
    fn headless_run_stops_when_asked() {
        let mut game = Recorder {
            stop_after: Some(3),
            ..Recorder::default()
        };
        let ran = run_headless(&mut game, RunOptions::default(), 10).unwrap();
        assert_eq!(ran, 3);
        assert!(game.updates.iter().all(|delta| *delta == HEADLESS_DELTA));

        let mut game = Recorder::default();
        assert_eq!(run_headless(&mut game, RunOptions::default(), 5).unwrap(), 5);
    }

    #[test]
    fn stopper_is_shared() {
        let engine = Engine::new(RunOptions::default());
        let stopper = engine.stopper();
        assert!(stopper.is_running());
        stopper.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn shutdown_empties_registries() {
        let mut engine = Engine::new(RunOptions::default());
        engine.shutdown();
        assert!(engine.systems.is_empty());
        assert!(engine.scenes.is_empty());
        assert!(engine.resources.is_empty());
    }

    #[test]
    fn options_parse_from_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"title": "Demo", "width": 320, "clear_color": [0.1, 0.2, 0.3, 1.0]}"#)
            .unwrap();
        let options = RunOptions::from_json_file(&path).unwrap();
        assert_eq!(options.title, "Demo");
        assert_eq!(options.width, 320);
        assert_eq!(options.height, DEFAULT_HEIGHT);
        assert_eq!(options.clear_color, Vec4::new(0.1, 0.2, 0.3, 1.0));
        assert!(options.exit_on_close);

        assert!(RunOptions::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn engine_starts_without_gpu() {
        let engine = Engine::new(RunOptions::default());
        assert!(engine.gpu().is_none());
    }

    #[test]
    fn render_to_target_requires_a_gpu() {
        let engine = Engine::new(RunOptions::default());
        let err = engine.require_gpu().unwrap_err();
        assert_eq!(err.to_string(), "cannot render without a GPU context");

        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let target = RenderTarget::new(&gpu, 32, 32, TextureFilter::Nearest);
        let mut engine = Engine::new(RunOptions::default());
        let err = engine.render_to_target(&target).unwrap_err();
        assert_eq!(err.to_string(), "cannot render without a GPU context");
    }

    #[test]
    fn render_to_target_draws_visible_sprites() {
        let Ok(gpu) = GpuContext::headless() else {
            return;
        };
        let gpu = Arc::new(gpu);
        let target = RenderTarget::new(&gpu, 64, 64, TextureFilter::Nearest);
        let mut engine = Engine::new(RunOptions::default());
        engine.attach_gpu(Arc::clone(&gpu));
        let texture = Arc::new(Texture::from_rgba(
            RgbaImage::new(4, 4),
            TextureFilter::Nearest,
            false,
        ));
        let visible = Sprite::new(Arc::clone(&texture));
        let hidden = Sprite::new(texture);
        hidden.pos.write().visible = false;
        assert!(engine.add_actor(&visible));
        assert!(engine.add_actor(&hidden));

        assert_eq!(engine.render_to_target(&target).unwrap(), 1);
    }
}

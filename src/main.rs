use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec4};
use log::info;

use pebble::{
    shared, Action, Actor, AnimatedSprite, Engine, Font, Game, Keyframe, KeyframeAnimation, KeyframeSet,
    KeyboardListener, KeyCode, Mesh, Model, Modifiers, MouseButton, MouseListener, NamedKey,
    PngLoader, Pos2D, RunOptions, Shared, Sprite, Stopper, Text, TextureFilter, WindowInitError,
};

const DEFAULT_HEADLESS_FRAMES: u32 = 60;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = CliOptions::parse()?;
    let options = match &cli.config {
        Some(path) => RunOptions::from_json_file(path)?,
        None => cli.demo.default_options(),
    };
    let assets = cli.assets.clone();
    match cli.demo {
        DemoKind::Sprite => launch(|| SpriteDemo::new(&assets), &cli, options),
        DemoKind::Model => launch(|| ModelDemo::new(&assets), &cli, options),
        DemoKind::Keyframe => launch(|| KeyframeDemo::new(&assets), &cli, options),
        DemoKind::Text => launch(|| TextDemo::new(&assets), &cli, options),
        DemoKind::Input => launch(|| InputDemo::new(&assets), &cli, options),
    }
}

/// A game that can describe its actors once the loop has ended.
trait Demo: Game {
    fn print_final_state(&self);
}

fn launch<G: Demo>(make: impl Fn() -> G, cli: &CliOptions, options: RunOptions) -> Result<()> {
    if cli.headless {
        return run_headless(make(), cli.frames, options);
    }
    let mut game = make();
    match pebble::run(&mut game, options.clone()) {
        Ok(()) => {
            game.print_final_state();
            Ok(())
        }
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --headless mode (set DISPLAY or install a GPU driver to open a window)."
            );
            run_headless(make(), cli.frames, options)
        }
        Err(err) => Err(err),
    }
}

fn run_headless<G: Demo>(mut game: G, frames: u32, options: RunOptions) -> Result<()> {
    let ran = pebble::run_headless(&mut game, options, frames)?;
    println!("Ran {ran} frame(s) without a window");
    game.print_final_state();
    Ok(())
}

fn print_pos(name: &str, pos: &Pos2D) {
    println!(
        " - {name} pos=({:.2}, {:.2}) size=({:.2}, {:.2}) rot={:.2} visible={}",
        pos.pos.x, pos.pos.y, pos.size.x, pos.size.y, pos.rot, pos.visible
    );
}

/// A single sprite, culled when it leaves the viewport.
struct SpriteDemo {
    assets: PathBuf,
    sprite: Option<Sprite>,
}

impl SpriteDemo {
    fn new(assets: &Path) -> Self {
        Self {
            assets: assets.to_path_buf(),
            sprite: None,
        }
    }
}

impl Game for SpriteDemo {
    fn setup(&mut self, engine: &mut Engine) -> Result<()> {
        engine.resources.load(self.assets.join("gopher.png"))?;
        let sprite = Sprite::new(engine.resources.texture("gopher.png")?);
        engine.systems.sprite_renderer()?.add_sprite(&sprite);
        engine.systems.culling_2d()?.add(sprite.id(), sprite.pos.clone());
        self.sprite = Some(sprite);
        Ok(())
    }
}

impl Demo for SpriteDemo {
    fn print_final_state(&self) {
        println!("Final actor states:");
        if let Some(sprite) = &self.sprite {
            print_pos("sprite", &sprite.pos.read());
        }
    }
}

/// A textured cube spinning around its upper axis.
struct ModelDemo {
    assets: PathBuf,
    model: Option<Model>,
}

impl ModelDemo {
    fn new(assets: &Path) -> Self {
        Self {
            assets: assets.to_path_buf(),
            model: None,
        }
    }
}

impl Game for ModelDemo {
    fn setup(&mut self, engine: &mut Engine) -> Result<()> {
        engine.resources.load_folder(&self.assets)?;
        let texture = engine.resources.texture("cube.png")?;
        let ply = engine.resources.ply("cube.ply")?;
        let model = Model::new(Arc::new(Mesh::from_ply(&ply)), texture);
        engine.systems.model_renderer()?.add_model(&model);
        self.model = Some(model);

        engine.settings.depth_test = true;
        engine.settings.clear_depth_buffer = true;
        Ok(())
    }

    fn update(&mut self, _engine: &mut Engine, delta: f64) {
        if let Some(model) = &self.model {
            model.pos.write().rot.z += (delta * 45.0) as f32;
        }
    }
}

impl Demo for ModelDemo {
    fn print_final_state(&self) {
        println!("Final actor states:");
        if let Some(model) = &self.model {
            let pos = model.pos.read();
            println!(
                " - model vertices={} rot=({:.2}, {:.2}, {:.2})",
                model.mesh.vertex_count(),
                pos.rot.x,
                pos.rot.y,
                pos.rot.z
            );
        }
    }
}

/// A running cat played from an 8 frame sprite sheet.
struct KeyframeDemo {
    assets: PathBuf,
    sprite: Option<AnimatedSprite>,
}

impl KeyframeDemo {
    fn new(assets: &Path) -> Self {
        Self {
            assets: assets.to_path_buf(),
            sprite: None,
        }
    }
}

impl Game for KeyframeDemo {
    fn setup(&mut self, engine: &mut Engine) -> Result<()> {
        engine.resources.load_folder(&self.assets)?;
        let texture = engine.resources.texture("runningcat.png")?;

        let mut set = KeyframeSet::new();
        for row in 0..4 {
            for column in 0..2 {
                let min = Vec2::new(column as f32 * 0.5, row as f32 * 0.25);
                set.add(Keyframe::new(min, min + Vec2::new(0.5, 0.25)));
            }
        }

        let sprite = AnimatedSprite::new(texture, shared(set), 512, 256);
        *sprite.animation.write() = KeyframeAnimation::new(0, 7, true, 20.0);
        engine.systems.keyframe_renderer()?.add_sprite(&sprite);
        self.sprite = Some(sprite);
        Ok(())
    }
}

impl Demo for KeyframeDemo {
    fn print_final_state(&self) {
        println!("Final actor states:");
        if let Some(sprite) = &self.sprite {
            print_pos("cat", &sprite.pos.read());
            println!("   frame={}", sprite.animation.read().current);
        }
    }
}

/// "Hello, World!" in a bitmap font, with a blinking cursor.
struct TextDemo {
    assets: PathBuf,
    font: Option<Arc<Font>>,
    text: Option<Text>,
    blink: f64,
}

impl TextDemo {
    const MESSAGE: &'static str = "Hello, World!";

    fn new(assets: &Path) -> Self {
        Self {
            assets: assets.to_path_buf(),
            font: None,
            text: None,
            blink: 0.0,
        }
    }
}

impl Game for TextDemo {
    fn setup(&mut self, engine: &mut Engine) -> Result<()> {
        // Cutting glyphs reads pixels, so the font texture keeps its data.
        let loader = engine
            .resources
            .loader_mut::<PngLoader>()
            .ok_or_else(|| anyhow!("could not obtain PNG loader"))?;
        *loader = PngLoader::new(TextureFilter::Nearest, true);
        let loaded = engine.resources.load(self.assets.join("victor.png"));
        if let Some(loader) = engine.resources.loader_mut::<PngLoader>() {
            *loader = PngLoader::default();
        }
        loaded?;

        let mut font = Font::new(engine.resources.texture("victor.png")?, 16.0);
        let glyphs = font.load_json(self.assets.join("victor.json"), true)?;
        info!("Loaded {glyphs} glyphs");
        let font = Arc::new(font);

        let text = Text::new(&font, &format!("{}_", Self::MESSAGE));
        {
            let mut pos = text.pos.write();
            pos.size = Vec2::splat(16.0);
            pos.pos = Vec2::new(20.0, 20.0);
        }
        let renderer = engine.systems.text_renderer()?;
        renderer.set_font(Some(font.clone()));
        renderer.add_text(&text);

        self.font = Some(font);
        self.text = Some(text);
        Ok(())
    }

    fn update(&mut self, _engine: &mut Engine, delta: f64) {
        let (Some(font), Some(text)) = (&self.font, &self.text) else {
            return;
        };
        self.blink += delta;
        let cursor = if self.blink % 1.0 < 0.5 { "_" } else { "" };
        let wanted = format!("{}{cursor}", Self::MESSAGE);
        if text.text() != wanted {
            text.set_text(font, &wanted);
        }
    }
}

impl Demo for TextDemo {
    fn print_final_state(&self) {
        println!("Final actor states:");
        if let Some(text) = &self.text {
            let bounds = text.bounds();
            println!(
                " - text {:?} bounds=({:.2}, {:.2})",
                text.text(),
                bounds.x,
                bounds.y
            );
        }
    }
}

/// A small sprite moved by left clicks. Escape quits.
struct InputDemo {
    assets: PathBuf,
    sprite: Option<Sprite>,
}

impl InputDemo {
    fn new(assets: &Path) -> Self {
        Self {
            assets: assets.to_path_buf(),
            sprite: None,
        }
    }
}

struct QuitOnEscape {
    stopper: Stopper,
}

impl KeyboardListener for QuitOnEscape {
    fn on_key_event(&mut self, key: KeyCode, action: Action, _modifiers: Modifiers) {
        if key == KeyCode::Named(NamedKey::Escape) && action == Action::Press {
            self.stopper.stop();
        }
    }
}

struct MoveOnClick {
    target: Shared<Pos2D>,
    mouse: Vec2,
}

impl MouseListener for MoveOnClick {
    fn on_mouse_button(&mut self, button: MouseButton, action: Action, _modifiers: Modifiers) {
        if button == MouseButton::LEFT && action == Action::Press {
            self.target.write().pos = self.mouse;
        }
    }

    fn on_mouse_move(&mut self, x: f64, y: f64) {
        self.mouse = Vec2::new(x as f32, y as f32);
    }
}

impl Game for InputDemo {
    fn setup(&mut self, engine: &mut Engine) -> Result<()> {
        engine.resources.load(self.assets.join("gopher.png"))?;
        let sprite = Sprite::new(engine.resources.texture("gopher.png")?);
        sprite.pos.write().size /= 4.0;
        engine.systems.sprite_renderer()?.add_sprite(&sprite);
        engine.systems.culling_2d()?.add(sprite.id(), sprite.pos.clone());

        engine.input.add_keyboard_listener(Box::new(QuitOnEscape {
            stopper: engine.stopper(),
        }));
        engine.input.add_mouse_listener(Box::new(MoveOnClick {
            target: sprite.pos.clone(),
            mouse: Vec2::ZERO,
        }));
        self.sprite = Some(sprite);
        Ok(())
    }
}

impl Demo for InputDemo {
    fn print_final_state(&self) {
        println!("Final actor states:");
        if let Some(sprite) = &self.sprite {
            print_pos("gopher", &sprite.pos.read());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemoKind {
    Sprite,
    Model,
    Keyframe,
    Text,
    Input,
}

impl DemoKind {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sprite" => Self::Sprite,
            "model" => Self::Model,
            "keyframe" => Self::Keyframe,
            "text" => Self::Text,
            "input" => Self::Input,
            _ => return None,
        })
    }

    fn default_options(self) -> RunOptions {
        let white = Vec4::new(1.0, 1.0, 1.0, 0.0);
        let options = RunOptions {
            title: format!("pebble {self}"),
            ..RunOptions::default()
        };
        match self {
            Self::Sprite | Self::Model | Self::Input => RunOptions {
                clear_color: white,
                ..options
            },
            Self::Keyframe => RunOptions {
                fullscreen: true,
                ..options
            },
            Self::Text => options,
        }
    }
}

impl fmt::Display for DemoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sprite => "sprite",
            Self::Model => "model",
            Self::Keyframe => "keyframe",
            Self::Text => "text",
            Self::Input => "input",
        })
    }
}

struct CliOptions {
    demo: DemoKind,
    assets: PathBuf,
    config: Option<PathBuf>,
    headless: bool,
    frames: u32,
}

const USAGE: &str = "Usage: pebble <sprite|model|keyframe|text|input> [--assets DIR] [--config FILE] [--headless] [--frames N]";

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(name) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let demo = DemoKind::parse(&name)
            .ok_or_else(|| anyhow!("Unknown demo: {name}. {USAGE}"))?;

        let mut assets = None;
        let mut config = None;
        let mut headless = false;
        let mut frames = DEFAULT_HEADLESS_FRAMES;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--assets" => assets = Some(PathBuf::from(value(&mut args, "--assets")?)),
                "--config" => config = Some(PathBuf::from(value(&mut args, "--config")?)),
                "--headless" => headless = true,
                "--frames" => {
                    let raw = value(&mut args, "--frames")?;
                    frames = raw
                        .parse()
                        .with_context(|| format!("--frames expects a number, got {raw}"))?;
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }

        Ok(Self {
            demo,
            assets: assets.unwrap_or_else(|| Path::new("assets").join(demo.to_string())),
            config,
            headless,
            frames,
        })
    }
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_demo_and_flags() {
        let cli = CliOptions::from_args(args(&[
            "text", "--headless", "--frames", "5", "--assets", "fonts",
        ]))
        .unwrap();
        assert_eq!(cli.demo, DemoKind::Text);
        assert!(cli.headless);
        assert_eq!(cli.frames, 5);
        assert_eq!(cli.assets, PathBuf::from("fonts"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn assets_default_to_demo_folder() {
        let cli = CliOptions::from_args(args(&["keyframe"])).unwrap();
        assert_eq!(cli.assets, Path::new("assets").join("keyframe"));
        assert_eq!(cli.frames, DEFAULT_HEADLESS_FRAMES);
        assert!(cli.demo.default_options().fullscreen);
    }

    #[test]
    fn rejects_unknown_demo_and_missing_values() {
        assert!(CliOptions::from_args(args(&[])).is_err());
        assert!(CliOptions::from_args(args(&["pong"])).is_err());
        assert!(CliOptions::from_args(args(&["sprite", "--frames"])).is_err());
        assert!(CliOptions::from_args(args(&["sprite", "--frames", "many"])).is_err());
    }

    #[test]
    fn click_moves_sprite_to_last_mouse_position() {
        let target = shared(Pos2D::default());
        let mut listener = MoveOnClick {
            target: target.clone(),
            mouse: Vec2::ZERO,
        };
        listener.on_mouse_move(40.0, 30.0);
        listener.on_mouse_button(MouseButton::RIGHT, Action::Press, Modifiers::default());
        assert_eq!(target.read().pos, Vec2::ZERO);
        listener.on_mouse_button(MouseButton::LEFT, Action::Press, Modifiers::default());
        assert_eq!(target.read().pos, Vec2::new(40.0, 30.0));
    }
}

//! Windowed frame loop on top of winit.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKeyCode, ModifiersState, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::game::{Engine, Game, RunOptions};
use crate::input::{Action, KeyCode, Modifiers, MouseButton, NamedKey};
use crate::render::{self, WindowSurface};

/// The window, event loop or GPU could not be brought up. Callers may fall
/// back to running headless.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// Opens a window and runs `game` until it stops or the window closes.
///
/// The game is set up before the window opens, so `setup` must not rely
/// on a GPU. Failing to create the event loop, the window or the GPU
/// context yields a [`WindowInitError`].
pub fn run<G: Game>(game: &mut G, options: RunOptions) -> Result<()> {
    info!("Initializing event loop");
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut engine = Engine::new(options);
    game.setup(&mut engine).context("game setup failed")?;

    let mut app = App {
        game,
        engine,
        surface: None,
        modifiers: Modifiers::default(),
        last_frame: None,
        error: None,
    };
    info!("Starting main loop");
    event_loop.run_app(&mut app).context("event loop failed")?;

    app.engine.shutdown();
    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct App<'g, G: Game> {
    game: &'g mut G,
    engine: Engine,
    surface: Option<WindowSurface>,
    modifiers: Modifiers,
    last_frame: Option<Instant>,
    error: Option<anyhow::Error>,
}

impl<G: Game> App<'_, G> {
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        info!("Creating window");
        let options = self.engine.options();
        let mut attributes = Window::default_attributes()
            .with_title(options.title.clone())
            .with_inner_size(LogicalSize::new(options.width, options.height))
            .with_resizable(options.resizable);
        if options.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let (surface, gpu) = pollster::block_on(WindowSurface::create(Arc::clone(&window)))
            .map_err(|err| WindowInitError::from_error("GPU", format!("{err:#}")))?;
        self.engine.attach_gpu(Arc::new(gpu));

        let size = window.inner_size();
        if size.width != self.engine.width() || size.height != self.engine.height() {
            self.engine.handle_resize(self.game, size.width, size.height);
        }
        self.surface = Some(surface);
        window.request_redraw();
        Ok(())
    }

    fn window_id(&self) -> Option<WindowId> {
        self.surface.as_ref().map(WindowSurface::window_id)
    }

    fn frame(&mut self) -> Result<()> {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        self.engine.step(self.game, delta);
        self.render()
    }

    fn render(&mut self) -> Result<()> {
        let (Some(surface), Some(gpu)) = (self.surface.as_mut(), self.engine.gpu().cloned()) else {
            return Ok(());
        };
        let output = match surface.acquire() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.reconfigure(&gpu);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(err) => {
                warn!("Surface error {err}; retrying next frame");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        render::render_systems(
            &gpu,
            &view,
            surface.depth_view(),
            surface.format(),
            &self.engine.settings,
            &mut self.engine.systems,
        )?;
        surface.window().pre_present_notify();
        output.present();
        Ok(())
    }

    fn handle_event(&mut self, event: WindowEvent) -> Result<()> {
        match event {
            WindowEvent::CloseRequested => {
                if self.engine.options().exit_on_close {
                    self.engine.stop();
                }
            }
            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    return Ok(());
                }
                if let (Some(surface), Some(gpu)) = (self.surface.as_mut(), self.engine.gpu()) {
                    surface.resize(gpu, size);
                }
                self.engine.handle_resize(self.game, size.width, size.height);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = map_modifiers(modifiers.state());
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return Ok(());
                };
                let Some(key) = map_keycode(code) else {
                    return Ok(());
                };
                let action = match (event.state, event.repeat) {
                    (ElementState::Pressed, false) => Action::Press,
                    (ElementState::Pressed, true) => Action::Repeat,
                    (ElementState::Released, _) => Action::Release,
                };
                self.engine.input.key_event(key, action, self.modifiers);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let action = match state {
                    ElementState::Pressed => Action::Press,
                    ElementState::Released => Action::Release,
                };
                self.engine
                    .input
                    .mouse_button_event(map_mouse_button(button), action, self.modifiers);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.engine.input.mouse_move_event(position.x, position.y);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (x as f64, y as f64),
                    MouseScrollDelta::PixelDelta(position) => (position.x, position.y),
                };
                self.engine.input.mouse_scroll_event(x, y);
            }
            WindowEvent::RedrawRequested => {
                self.frame()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl<G: Game> ApplicationHandler for App<'_, G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }
        if let Err(err) = self.create_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window_id() != Some(window_id) {
            return;
        }
        if let Err(err) = self.handle_event(event) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.engine.is_running() {
            event_loop.exit();
            return;
        }
        if let Some(surface) = &self.surface {
            surface.window().request_redraw();
        }
    }
}

fn map_modifiers(state: ModifiersState) -> Modifiers {
    Modifiers {
        shift: state.shift_key(),
        ctrl: state.control_key(),
        alt: state.alt_key(),
        logo: state.super_key(),
    }
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    let index = match button {
        WinitMouseButton::Left => 0,
        WinitMouseButton::Right => 1,
        WinitMouseButton::Middle => 2,
        WinitMouseButton::Back => 3,
        WinitMouseButton::Forward => 4,
        WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
    };
    MouseButton::new(index)
}

fn map_keycode(code: WinitKeyCode) -> Option<KeyCode> {
    use WinitKeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter | Key::NumpadEnter => KeyCode::Named(NamedKey::Enter),
        Key::Tab => KeyCode::Named(NamedKey::Tab),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Backspace => KeyCode::Named(NamedKey::Backspace),
        Key::Delete => KeyCode::Named(NamedKey::Delete),
        Key::Home => KeyCode::Named(NamedKey::Home),
        Key::End => KeyCode::Named(NamedKey::End),
        Key::PageUp => KeyCode::Named(NamedKey::PageUp),
        Key::PageDown => KeyCode::Named(NamedKey::PageDown),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::ControlLeft => KeyCode::Named(NamedKey::LeftCtrl),
        Key::ControlRight => KeyCode::Named(NamedKey::RightCtrl),
        Key::AltLeft => KeyCode::Named(NamedKey::LeftAlt),
        Key::AltRight => KeyCode::Named(NamedKey::RightAlt),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        Key::F1 => KeyCode::Function(1),
        Key::F2 => KeyCode::Function(2),
        Key::F3 => KeyCode::Function(3),
        Key::F4 => KeyCode::Function(4),
        Key::F5 => KeyCode::Function(5),
        Key::F6 => KeyCode::Function(6),
        Key::F7 => KeyCode::Function(7),
        Key::F8 => KeyCode::Function(8),
        Key::F9 => KeyCode::Function(9),
        Key::F10 => KeyCode::Function(10),
        Key::F11 => KeyCode::Function(11),
        Key::F12 => KeyCode::Function(12),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_letters_digits_and_named_keys() {
        assert_eq!(map_keycode(WinitKeyCode::KeyQ), Some(KeyCode::Character('Q')));
        assert_eq!(map_keycode(WinitKeyCode::Digit7), Some(KeyCode::Digit(7)));
        assert_eq!(
            map_keycode(WinitKeyCode::Escape),
            Some(KeyCode::Named(NamedKey::Escape))
        );
        assert_eq!(map_keycode(WinitKeyCode::F12), Some(KeyCode::Function(12)));
        assert_eq!(map_keycode(WinitKeyCode::CapsLock), None);
    }

    #[test]
    fn maps_mouse_buttons_to_indices() {
        assert_eq!(map_mouse_button(WinitMouseButton::Left), MouseButton::LEFT);
        assert_eq!(map_mouse_button(WinitMouseButton::Middle), MouseButton::MIDDLE);
        assert_eq!(map_mouse_button(WinitMouseButton::Other(600)).index(), 255);
    }

    #[test]
    fn maps_modifier_state() {
        let modifiers = map_modifiers(ModifiersState::SHIFT | ModifiersState::CONTROL);
        assert!(modifiers.shift && modifiers.ctrl);
        assert!(!modifiers.alt && !modifiers.logo);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let err = WindowInitError::from_panic("event loop", Box::new("no display"));
        assert_eq!(err.to_string(), "failed to initialize event loop: no display");
    }
}

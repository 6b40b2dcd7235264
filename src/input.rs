use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if ch.is_ascii_digit() {
                return Some(Self::Digit(ch as u8 - b'0'));
            }
        }
        if let Some(function) = name.strip_prefix('F').or_else(|| name.strip_prefix('f')) {
            if let Ok(index) = function.parse::<u8>() {
                if (1..=25).contains(&index) {
                    return Some(Self::Function(index));
                }
            }
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "Backspace" => Backspace,
        "Delete" => Delete,
        "Home" => Home,
        "End" => End,
        "PageUp" => PageUp,
        "PageDown" => PageDown,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        "LeftCtrl" | "LControl" => LeftCtrl,
        "RightCtrl" | "RControl" => RightCtrl,
        "LeftAlt" | "LAlt" => LeftAlt,
        "RightAlt" | "RAlt" => RightAlt,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for keys without a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Press,
    Release,
    Repeat,
}

/// Modifier keys held while an event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub logo: bool,
}

pub trait KeyboardListener {
    fn on_key_event(&mut self, key: KeyCode, action: Action, modifiers: Modifiers);
}

/// Receives mouse events. Positions have their origin in the lower left
/// corner of the viewport.
pub trait MouseListener {
    fn on_mouse_button(&mut self, _button: MouseButton, _action: Action, _modifiers: Modifiers) {}

    fn on_mouse_move(&mut self, _x: f64, _y: f64) {}

    fn on_mouse_scroll(&mut self, _x: f64, _y: f64) {}
}

/// Handle returned when registering a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Snapshot of pressed keys, pressed buttons and the cursor position.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    mouse_buttons: HashSet<MouseButton>,
    mouse_position: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn set_mouse_button_down(&mut self, button: MouseButton) {
        self.mouse_buttons.insert(button);
    }

    pub fn set_mouse_button_up(&mut self, button: MouseButton) {
        self.mouse_buttons.remove(&button);
    }

    pub fn set_mouse_position(&mut self, position: Vec2) {
        self.mouse_position = position;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        match parse_input_name(name) {
            Some(InputName::Key(key)) => self.is_key_down(key),
            Some(InputName::Mouse(button)) => self.is_mouse_button_down(button),
            None => false,
        }
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }
}

enum InputName {
    Key(KeyCode),
    Mouse(MouseButton),
}

fn parse_input_name(name: &str) -> Option<InputName> {
    if let Some(button) = parse_mouse_button(name) {
        return Some(InputName::Mouse(button));
    }
    KeyCode::from_name(name).map(InputName::Key)
}

fn parse_mouse_button(name: &str) -> Option<MouseButton> {
    let prefix = name.get(..5)?;
    if !prefix.eq_ignore_ascii_case("mouse") {
        return None;
    }
    let suffix = &name[5..];
    if suffix.is_empty() {
        return Some(MouseButton::LEFT);
    }
    match suffix.parse::<u8>().ok()? {
        0 => None,
        index => Some(MouseButton::new(index - 1)),
    }
}

/// Listener registry fed by the window event loop.
#[derive(Default)]
pub struct Input {
    keyboard: Vec<(ListenerId, Box<dyn KeyboardListener>)>,
    mouse: Vec<(ListenerId, Box<dyn MouseListener>)>,
    state: InputState,
    viewport_height: f64,
    next_id: u64,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_keyboard_listener(&mut self, listener: Box<dyn KeyboardListener>) -> ListenerId {
        let id = self.next_id();
        self.keyboard.push((id, listener));
        id
    }

    pub fn remove_keyboard_listener(&mut self, id: ListenerId) -> bool {
        let before = self.keyboard.len();
        self.keyboard.retain(|(existing, _)| *existing != id);
        before != self.keyboard.len()
    }

    pub fn remove_all_keyboard_listeners(&mut self) {
        self.keyboard.clear();
    }

    pub fn add_mouse_listener(&mut self, listener: Box<dyn MouseListener>) -> ListenerId {
        let id = self.next_id();
        self.mouse.push((id, listener));
        id
    }

    pub fn remove_mouse_listener(&mut self, id: ListenerId) -> bool {
        let before = self.mouse.len();
        self.mouse.retain(|(existing, _)| *existing != id);
        before != self.mouse.len()
    }

    pub fn remove_all_mouse_listeners(&mut self) {
        self.mouse.clear();
    }

    pub fn keyboard_listener_count(&self) -> usize {
        self.keyboard.len()
    }

    pub fn mouse_listener_count(&self) -> usize {
        self.mouse.len()
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    /// Height used to flip cursor positions into viewport space.
    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height;
    }

    pub fn key_event(&mut self, key: KeyCode, action: Action, modifiers: Modifiers) {
        match action {
            Action::Press => self.state.set_key_down(key),
            Action::Release => self.state.set_key_up(key),
            Action::Repeat => {}
        }
        for (_, listener) in self.keyboard.iter_mut() {
            listener.on_key_event(key, action, modifiers);
        }
    }

    pub fn mouse_button_event(&mut self, button: MouseButton, action: Action, modifiers: Modifiers) {
        match action {
            Action::Press => self.state.set_mouse_button_down(button),
            Action::Release => self.state.set_mouse_button_up(button),
            Action::Repeat => {}
        }
        for (_, listener) in self.mouse.iter_mut() {
            listener.on_mouse_button(button, action, modifiers);
        }
    }

    /// Forwards a cursor position given in window coordinates (origin top
    /// left). Listeners receive y measured from the bottom.
    pub fn mouse_move_event(&mut self, x: f64, y: f64) {
        let y = self.viewport_height - y;
        self.state.set_mouse_position(Vec2::new(x as f32, y as f32));
        for (_, listener) in self.mouse.iter_mut() {
            listener.on_mouse_move(x, y);
        }
    }

    pub fn mouse_scroll_event(&mut self, x: f64, y: f64) {
        for (_, listener) in self.mouse.iter_mut() {
            listener.on_mouse_scroll(x, y);
        }
    }

    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

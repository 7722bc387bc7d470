// Winit keyboard/mouse bridge
//
// Maps winit key codes and mouse buttons to control names and writes them
// into a `VirtualDevices` keyboard and mouse, so a windowed host can drive
// the router with `<Keyboard>/space` style bindings.

use super::device::{DeviceId, VirtualDevices};
use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels per scroll line when the platform reports line deltas
const PIXELS_PER_LINE: f32 = 20.0;

/// Control name for a physical key
pub fn key_control(code: KeyCode) -> Option<&'static str> {
    let name = match code {
        KeyCode::KeyA => "a",
        KeyCode::KeyB => "b",
        KeyCode::KeyC => "c",
        KeyCode::KeyD => "d",
        KeyCode::KeyE => "e",
        KeyCode::KeyF => "f",
        KeyCode::KeyG => "g",
        KeyCode::KeyH => "h",
        KeyCode::KeyI => "i",
        KeyCode::KeyJ => "j",
        KeyCode::KeyK => "k",
        KeyCode::KeyL => "l",
        KeyCode::KeyM => "m",
        KeyCode::KeyN => "n",
        KeyCode::KeyO => "o",
        KeyCode::KeyP => "p",
        KeyCode::KeyQ => "q",
        KeyCode::KeyR => "r",
        KeyCode::KeyS => "s",
        KeyCode::KeyT => "t",
        KeyCode::KeyU => "u",
        KeyCode::KeyV => "v",
        KeyCode::KeyW => "w",
        KeyCode::KeyX => "x",
        KeyCode::KeyY => "y",
        KeyCode::KeyZ => "z",
        KeyCode::Digit0 => "0",
        KeyCode::Digit1 => "1",
        KeyCode::Digit2 => "2",
        KeyCode::Digit3 => "3",
        KeyCode::Digit4 => "4",
        KeyCode::Digit5 => "5",
        KeyCode::Digit6 => "6",
        KeyCode::Digit7 => "7",
        KeyCode::Digit8 => "8",
        KeyCode::Digit9 => "9",
        KeyCode::Space => "space",
        KeyCode::Enter => "enter",
        KeyCode::NumpadEnter => "numpadEnter",
        KeyCode::Escape => "escape",
        KeyCode::Tab => "tab",
        KeyCode::Backspace => "backspace",
        KeyCode::ArrowUp => "upArrow",
        KeyCode::ArrowDown => "downArrow",
        KeyCode::ArrowLeft => "leftArrow",
        KeyCode::ArrowRight => "rightArrow",
        KeyCode::ShiftLeft => "leftShift",
        KeyCode::ShiftRight => "rightShift",
        KeyCode::ControlLeft => "leftCtrl",
        KeyCode::ControlRight => "rightCtrl",
        KeyCode::AltLeft => "leftAlt",
        KeyCode::AltRight => "rightAlt",
        KeyCode::F1 => "f1",
        KeyCode::F2 => "f2",
        KeyCode::F3 => "f3",
        KeyCode::F4 => "f4",
        _ => return None,
    };
    Some(name)
}

/// Control name for a mouse button
pub fn mouse_control(button: MouseButton) -> Option<&'static str> {
    match button {
        MouseButton::Left => Some("leftButton"),
        MouseButton::Right => Some("rightButton"),
        MouseButton::Middle => Some("middleButton"),
        MouseButton::Back => Some("backButton"),
        MouseButton::Forward => Some("forwardButton"),
        _ => None,
    }
}

/// Feeds winit events into a virtual keyboard and mouse
pub struct KeyboardMouseBridge {
    devices: VirtualDevices,
    keyboard: DeviceId,
    mouse: DeviceId,

    /// Pointer motion accumulated since the last flush
    motion: Vec2,

    scroll: Vec2,
}

impl KeyboardMouseBridge {
    /// Connect a keyboard and a mouse on `devices`
    pub fn new(devices: &VirtualDevices) -> Self {
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let mouse = devices.connect("Mouse", "Mouse");
        Self {
            devices: devices.clone(),
            keyboard,
            mouse,
            motion: Vec2::ZERO,
            scroll: Vec2::ZERO,
        }
    }

    pub fn keyboard(&self) -> DeviceId {
        self.keyboard
    }

    pub fn mouse(&self) -> DeviceId {
        self.mouse
    }

    /// Apply a key transition, returns false for unmapped keys and repeats
    pub fn process_key(&mut self, code: KeyCode, state: ElementState, repeat: bool) -> bool {
        // Only register if not a key repeat
        if repeat {
            return false;
        }
        let Some(control) = key_control(code) else {
            return false;
        };
        self.devices
            .set_button(self.keyboard, control, state == ElementState::Pressed);
        true
    }

    /// Process a keyboard event from winit
    pub fn process_keyboard_event(&mut self, event: &KeyEvent) -> bool {
        // Only process physical key presses
        match event.physical_key {
            PhysicalKey::Code(code) => self.process_key(code, event.state, event.repeat),
            PhysicalKey::Unidentified(_) => false,
        }
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) -> bool {
        let Some(control) = mouse_control(button) else {
            return false;
        };
        self.devices
            .set_button(self.mouse, control, state == ElementState::Pressed);
        true
    }

    /// Accumulate raw pointer motion (screen y grows downwards)
    pub fn process_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.motion += Vec2::new(dx as f32, -(dy as f32));
    }

    pub fn process_mouse_wheel(&mut self, delta: MouseScrollDelta) {
        self.scroll += match delta {
            MouseScrollDelta::LineDelta(x, y) => Vec2::new(x, y) * PIXELS_PER_LINE,
            MouseScrollDelta::PixelDelta(position) => {
                Vec2::new(position.x as f32, position.y as f32)
            }
        };
    }

    /// Publish this frame's accumulated motion and scroll, then reset them
    pub fn flush_motion(&mut self) {
        self.devices.set_vector2(self.mouse, "delta", self.motion);
        self.devices.set_vector2(self.mouse, "scroll", self.scroll);
        self.motion = Vec2::ZERO;
        self.scroll = Vec2::ZERO;
    }

    /// Release every key and button, e.g. when the window loses focus
    pub fn release_all(&mut self) {
        self.devices.release_all(self.keyboard);
        self.devices.release_all(self.mouse);
        self.motion = Vec2::ZERO;
        self.scroll = Vec2::ZERO;
    }
}

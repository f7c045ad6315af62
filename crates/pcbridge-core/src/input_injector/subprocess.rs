//! Fallback input path: spawns `xdotool` per event when no persistent
//! display-system connection is available. Grounded in the original
//! Python service's `input_handler.py`, which drove the same tool the
//! same way. Each call is a detached spawn — never waited on — so a
//! slow or hung `xdotool` cannot block the input loop (spec.md §4.6).

use std::process::{Command, Stdio};

use crate::protocol::input::MouseButton;

fn button_number(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Middle => 2,
        MouseButton::Right => 3,
        MouseButton::X1 => 8,
        MouseButton::X2 => 9,
    }
}

fn spawn_detached(args: &[&str]) {
    let result = Command::new("xdotool")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(e) = result {
        log::warn!("failed to spawn xdotool {args:?}: {e}");
    }
}

pub struct SubprocessInjector;

impl SubprocessInjector {
    pub fn new() -> Self {
        Self
    }

    pub fn mouse_move(&mut self, x: i32, y: i32) {
        spawn_detached(&["mousemove", "--sync", &x.to_string(), &y.to_string()]);
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        let verb = if pressed { "mousedown" } else { "mouseup" };
        spawn_detached(&[verb, &button_number(button).to_string()]);
    }

    pub fn mouse_scroll(&mut self, dx: i32, dy: i32) {
        for _ in 0..dy.unsigned_abs() {
            spawn_detached(&["click", if dy < 0 { "4" } else { "5" }]);
        }
        for _ in 0..dx.unsigned_abs() {
            spawn_detached(&["click", if dx < 0 { "6" } else { "7" }]);
        }
    }

    pub fn key_event(&mut self, key: &str, pressed: bool) {
        let verb = if pressed { "keydown" } else { "keyup" };
        spawn_detached(&[verb, key]);
    }

    pub fn type_text(&mut self, text: &str) {
        spawn_detached(&["type", "--clearmodifiers", "--delay", "0", text]);
    }
}

impl Default for SubprocessInjector {
    fn default() -> Self {
        Self::new()
    }
}

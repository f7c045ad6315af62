//! Fast input path: a persistent XTest connection, one round-trip per
//! event, with a cache-then-scan keysym lookup covering the bridge's
//! mouse/key/scroll vocabulary.

use std::collections::HashMap;
use std::sync::Arc;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::protocol::xtest;
use x11rb::xcb_ffi::XCBConnection;

use super::keymap;
use crate::error::{BridgeError, Result};
use crate::protocol::input::MouseButton;

const INPUT_KEY_PRESS: u8 = 2;
const INPUT_KEY_RELEASE: u8 = 3;
const INPUT_BUTTON_PRESS: u8 = 4;
const INPUT_BUTTON_RELEASE: u8 = 5;

fn button_number(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Middle => 2,
        MouseButton::Right => 3,
        MouseButton::X1 => 8,
        MouseButton::X2 => 9,
    }
}

pub struct XtestInjector {
    conn: Arc<XCBConnection>,
    root: Window,
    mouse_x: i32,
    mouse_y: i32,
    keysym_cache: HashMap<u32, u8>,
}

unsafe impl Send for XtestInjector {}

impl XtestInjector {
    pub fn new(conn: Arc<XCBConnection>, screen_num: i32) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num as usize];
        let root = screen.root;

        let mut keysym_cache = HashMap::new();
        let min_keycode = conn.setup().min_keycode;
        let max_keycode = conn.setup().max_keycode;
        if let Ok(cookie) = conn.get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1) {
            if let Ok(mapping) = cookie.reply() {
                let keysyms_per_keycode = mapping.keysyms_per_keycode as usize;
                for i in 0..=(max_keycode - min_keycode) as usize {
                    let offset = i * keysyms_per_keycode;
                    if offset < mapping.keysyms.len() && mapping.keysyms[offset] != 0 {
                        keysym_cache
                            .entry(mapping.keysyms[offset])
                            .or_insert((min_keycode as usize + i) as u8);
                    }
                }
            }
        }

        Ok(Self {
            conn,
            root,
            mouse_x: 0,
            mouse_y: 0,
            keysym_cache,
        })
    }

    fn keysym_to_keycode(&self, keysym: u32) -> Option<u8> {
        if let Some(&kc) = self.keysym_cache.get(&keysym) {
            return Some(kc);
        }
        let min_keycode = self.conn.setup().min_keycode;
        let max_keycode = self.conn.setup().max_keycode;
        for kc in min_keycode..=max_keycode {
            if let Ok(reply) = self
                .conn
                .get_keyboard_mapping(kc, 1)
                .ok()?
                .reply()
            {
                if !reply.keysyms.is_empty() && reply.keysyms[0] == keysym {
                    return Some(kc);
                }
            }
        }
        None
    }

    pub fn mouse_move(&mut self, x: i32, y: i32) -> Result<()> {
        self.mouse_x = x;
        self.mouse_y = y;
        let wx = x.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let wy = y.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        self.conn
            .warp_pointer(0u32, self.root, 0, 0, 0, 0, wx, wy)
            .map_err(|e| BridgeError::Injector(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| BridgeError::Injector(e.to_string()))?;
        Ok(())
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) -> Result<()> {
        let input_type = if pressed {
            INPUT_BUTTON_PRESS
        } else {
            INPUT_BUTTON_RELEASE
        };
        self.fake_input(input_type, button_number(button))
    }

    /// Each integer step of `dy`/`dx` fires one press/release pair of the
    /// corresponding wheel button (up=4, down=5, left=6, right=7).
    pub fn mouse_scroll(&mut self, dx: i32, dy: i32) -> Result<()> {
        let button = |b: u8| -> Result<()> {
            self.fake_input(INPUT_BUTTON_PRESS, b)?;
            self.fake_input(INPUT_BUTTON_RELEASE, b)
        };
        for _ in 0..dy.unsigned_abs() {
            button(if dy < 0 { 4 } else { 5 })?;
        }
        for _ in 0..dx.unsigned_abs() {
            button(if dx < 0 { 6 } else { 7 })?;
        }
        Ok(())
    }

    pub fn key_event(&mut self, key: &str, pressed: bool) -> Result<()> {
        let Some(keysym) = keymap::resolve_keysym(key) else {
            log::warn!("unrecognized key name: {key}");
            return Ok(());
        };
        let Some(keycode) = self.keysym_to_keycode(keysym) else {
            log::warn!("no keycode mapped for keysym 0x{keysym:x} ({key})");
            return Ok(());
        };
        let input_type = if pressed { INPUT_KEY_PRESS } else { INPUT_KEY_RELEASE };
        self.fake_input(input_type, keycode)
    }

    /// Best-effort text typing: presses and releases each character's
    /// keysym in turn. Characters with no existing keyboard-mapping entry
    /// are skipped (no keymap remapping is attempted).
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let Some(keysym) = keymap::keysym_for_char(ch) else {
                continue;
            };
            let Some(keycode) = self.keysym_to_keycode(keysym) else {
                log::debug!("skipping untypeable character {ch:?}");
                continue;
            };
            self.fake_input(INPUT_KEY_PRESS, keycode)?;
            self.fake_input(INPUT_KEY_RELEASE, keycode)?;
        }
        Ok(())
    }

    fn fake_input(&self, input_type: u8, detail: u8) -> Result<()> {
        xtest::fake_input(
            self.conn.as_ref(),
            input_type,
            detail,
            0,
            self.root,
            self.mouse_x as i16,
            self.mouse_y as i16,
            0,
        )
        .map_err(|e| BridgeError::Injector(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| BridgeError::Injector(e.to_string()))?;
        Ok(())
    }
}

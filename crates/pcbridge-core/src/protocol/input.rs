//! Input channel envelopes.
//!
//! One tagged enum per spec.md §4.6: `mouse_move`, `mouse_press`/
//! `mouse_release`, `mouse_scroll`, `key_press`/`key_release`. Decoded
//! once at the framing boundary, then dispatched by the session's input
//! loop to the injector.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    X1,
    X2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    MouseMove { x: i32, y: i32 },
    MousePress { button: MouseButton },
    MouseRelease { button: MouseButton },
    MouseScroll { dx: i32, dy: i32 },
    KeyPress { key: String },
    KeyRelease { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mouse_move() {
        let json = r#"{"type":"mouse_move","x":100,"y":200}"#;
        let event: InputEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, InputEvent::MouseMove { x: 100, y: 200 });
    }

    #[test]
    fn decodes_mouse_button_variants() {
        let json = r#"{"type":"mouse_press","button":"left"}"#;
        let event: InputEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            InputEvent::MousePress {
                button: MouseButton::Left
            }
        );
    }

    #[test]
    fn round_trips_through_envelope_framing() {
        let mut buf = Vec::new();
        crate::protocol::write_envelope(&mut buf, &InputEvent::KeyPress { key: "a".into() })
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded: InputEvent = crate::protocol::read_envelope(&mut cursor)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, InputEvent::KeyPress { key: "a".into() });
    }
}

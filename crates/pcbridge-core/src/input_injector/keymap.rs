//! Key-name aliasing: `key_press`/`key_release` strings are display-system
//! keysym names (e.g. `"Return"`, `"a"`, `"Shift_L"`). Unrecognized names
//! are looked up in this table, then passed through unchanged — see
//! spec.md §4.6.
//!
//! The alias table covers the PC client's keyboard layer, which speaks a
//! small set of friendlier names than raw X11 keysym names.

/// Returns the keysym, trying the name as-is first and then through the
/// alias table.
pub fn resolve_keysym(name: &str) -> Option<u32> {
    let sym = xkbcommon::xkb::keysym_from_name(name, xkbcommon::xkb::KEYSYM_NO_FLAGS);
    if sym != xkbcommon::xkb::keysyms::KEY_NoSymbol.into() {
        return Some(sym.into());
    }

    let aliased = alias(name)?;
    let sym = xkbcommon::xkb::keysym_from_name(aliased, xkbcommon::xkb::KEYSYM_NO_FLAGS);
    if sym == xkbcommon::xkb::keysyms::KEY_NoSymbol.into() {
        None
    } else {
        Some(sym.into())
    }
}

fn alias(name: &str) -> Option<&'static str> {
    Some(match name {
        "Enter" => "Return",
        "Esc" => "Escape",
        "Ctrl" | "Control" => "Control_L",
        "Alt" => "Alt_L",
        "Shift" => "Shift_L",
        "Super" | "Win" | "Meta" => "Super_L",
        "CapsLock" => "Caps_Lock",
        "NumLock" => "Num_Lock",
        "PageUp" => "Page_Up",
        "PageDown" => "Page_Down",
        "Space" => "space",
        "Del" => "Delete",
        "Ins" => "Insert",
        _ => return None,
    })
}

/// Maps a unicode scalar to a keysym for `type_text`, for characters that
/// have no named alias.
pub fn keysym_for_char(ch: char) -> Option<u32> {
    let sym = xkbcommon::xkb::utf32_to_keysym(ch as u32);
    if sym == xkbcommon::xkb::keysyms::KEY_NoSymbol.into() {
        None
    } else {
        Some(sym.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_literal_keysym_name() {
        assert!(resolve_keysym("Return").is_some());
        assert!(resolve_keysym("a").is_some());
    }

    #[test]
    fn resolves_through_the_alias_table() {
        let aliased = resolve_keysym("Enter").unwrap();
        let direct = resolve_keysym("Return").unwrap();
        assert_eq!(aliased, direct);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        assert!(resolve_keysym("NotAKeyName___").is_none());
    }

    #[test]
    fn char_to_keysym_roundtrips_ascii() {
        let sym = keysym_for_char('Q').unwrap();
        assert_eq!(sym, resolve_keysym("Q").unwrap());
    }
}

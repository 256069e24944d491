//! X11 KeySym to HID Usage ID table for local keyboard events.
//!
//! KeySym values are defined in X11/keysymdef.h.
//!
//! A KeySym names the *character* a key produced, so the same physical key
//! arrives as different KeySyms depending on Shift: `XK_1` and `XK_exclam`,
//! `XK_a` and `XK_A`, `XK_bracketleft` and `XK_braceleft`. All of them map to
//! the one physical [`HidKeyCode`]; the shift state travels in the modifier
//! mask instead.

use super::hid::HidKeyCode;

/// Translates an X11 KeySym to a [`HidKeyCode`].
///
/// Returns [`HidKeyCode::Unknown`] if the KeySym has no mapping.
pub fn keysym_to_hid(keysym: u32) -> HidKeyCode {
    match keysym {
        // Letters, both cases (XK_A..XK_Z, XK_a..XK_z)
        0x0041..=0x005A => letter(keysym - 0x0041),
        0x0061..=0x007A => letter(keysym - 0x0061),

        // Digit row and its shifted symbols
        0x0031 | 0x0021 => HidKeyCode::Digit1, // XK_1, XK_exclam
        0x0032 | 0x0040 => HidKeyCode::Digit2, // XK_2, XK_at
        0x0033 | 0x0023 => HidKeyCode::Digit3, // XK_3, XK_numbersign
        0x0034 | 0x0024 => HidKeyCode::Digit4, // XK_4, XK_dollar
        0x0035 | 0x0025 => HidKeyCode::Digit5, // XK_5, XK_percent
        0x0036 | 0x005E => HidKeyCode::Digit6, // XK_6, XK_asciicircum
        0x0037 | 0x0026 => HidKeyCode::Digit7, // XK_7, XK_ampersand
        0x0038 | 0x002A => HidKeyCode::Digit8, // XK_8, XK_asterisk
        0x0039 | 0x0028 => HidKeyCode::Digit9, // XK_9, XK_parenleft
        0x0030 | 0x0029 => HidKeyCode::Digit0, // XK_0, XK_parenright

        // Punctuation and its shifted symbols
        0x0020 => HidKeyCode::Space,                   // XK_space
        0x002D | 0x005F => HidKeyCode::Minus,          // XK_minus, XK_underscore
        0x003D | 0x002B => HidKeyCode::Equal,          // XK_equal, XK_plus
        0x005B | 0x007B => HidKeyCode::BracketLeft,    // XK_bracketleft, XK_braceleft
        0x005D | 0x007D => HidKeyCode::BracketRight,   // XK_bracketright, XK_braceright
        0x005C | 0x007C => HidKeyCode::Backslash,      // XK_backslash, XK_bar
        0x003B | 0x003A => HidKeyCode::Semicolon,      // XK_semicolon, XK_colon
        0x0027 | 0x0022 => HidKeyCode::Quote,          // XK_apostrophe, XK_quotedbl
        0x0060 | 0x007E => HidKeyCode::Backquote,      // XK_grave, XK_asciitilde
        0x002C | 0x003C => HidKeyCode::Comma,          // XK_comma, XK_less
        0x002E | 0x003E => HidKeyCode::Period,         // XK_period, XK_greater
        0x002F | 0x003F => HidKeyCode::Slash,          // XK_slash, XK_question

        // Control keys
        0xFF0D | 0xFF8D => HidKeyCode::Enter,   // XK_Return, XK_KP_Enter
        0xFF1B => HidKeyCode::Escape,           // XK_Escape
        0xFF08 => HidKeyCode::Backspace,        // XK_BackSpace
        0xFF09 | 0xFE20 => HidKeyCode::Tab,     // XK_Tab, XK_ISO_Left_Tab
        0xFFE5 => HidKeyCode::CapsLock,         // XK_Caps_Lock

        // Function keys (XK_F1..XK_F12 are contiguous)
        0xFFBE..=0xFFC9 => function_key(keysym - 0xFFBE),

        // Navigation cluster
        0xFF61 => HidKeyCode::PrintScreen, // XK_Print
        0xFF14 => HidKeyCode::ScrollLock,  // XK_Scroll_Lock
        0xFF13 => HidKeyCode::Pause,       // XK_Pause
        0xFF63 => HidKeyCode::Insert,      // XK_Insert
        0xFF50 => HidKeyCode::Home,        // XK_Home
        0xFF55 => HidKeyCode::PageUp,      // XK_Page_Up
        0xFFFF => HidKeyCode::Delete,      // XK_Delete
        0xFF57 => HidKeyCode::End,         // XK_End
        0xFF56 => HidKeyCode::PageDown,    // XK_Page_Down
        0xFF53 => HidKeyCode::ArrowRight,  // XK_Right
        0xFF51 => HidKeyCode::ArrowLeft,   // XK_Left
        0xFF54 => HidKeyCode::ArrowDown,   // XK_Down
        0xFF52 => HidKeyCode::ArrowUp,     // XK_Up
        0xFF67 => HidKeyCode::ContextMenu, // XK_Menu

        // Numpad
        0xFF7F => HidKeyCode::NumLock,        // XK_Num_Lock
        0xFFAF => HidKeyCode::NumpadDivide,   // XK_KP_Divide
        0xFFAA => HidKeyCode::NumpadMultiply, // XK_KP_Multiply
        0xFFAD => HidKeyCode::NumpadSubtract, // XK_KP_Subtract
        0xFFAB => HidKeyCode::NumpadAdd,      // XK_KP_Add
        0xFFAE => HidKeyCode::NumpadDecimal,  // XK_KP_Decimal
        0xFFB0 => HidKeyCode::Numpad0,        // XK_KP_0
        0xFFB1..=0xFFB9 => numpad_digit(keysym - 0xFFB1),

        // Modifiers
        0xFFE1 => HidKeyCode::ShiftLeft,            // XK_Shift_L
        0xFFE2 => HidKeyCode::ShiftRight,           // XK_Shift_R
        0xFFE3 => HidKeyCode::ControlLeft,          // XK_Control_L
        0xFFE4 => HidKeyCode::ControlRight,         // XK_Control_R
        0xFFE9 => HidKeyCode::AltLeft,              // XK_Alt_L
        0xFFEA | 0xFE03 => HidKeyCode::AltRight,    // XK_Alt_R, XK_ISO_Level3_Shift
        0xFFE7 | 0xFFEB => HidKeyCode::MetaLeft,    // XK_Meta_L, XK_Super_L
        0xFFE8 | 0xFFEC => HidKeyCode::MetaRight,   // XK_Meta_R, XK_Super_R

        _ => HidKeyCode::Unknown,
    }
}

fn letter(offset: u32) -> HidKeyCode {
    HidKeyCode::from_u8(HidKeyCode::KeyA.as_u8() + offset as u8)
}

fn function_key(offset: u32) -> HidKeyCode {
    HidKeyCode::from_u8(HidKeyCode::F1.as_u8() + offset as u8)
}

fn numpad_digit(offset: u32) -> HidKeyCode {
    HidKeyCode::from_u8(HidKeyCode::Numpad1.as_u8() + offset as u8)
}

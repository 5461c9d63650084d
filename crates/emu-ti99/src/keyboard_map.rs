//! Host keyboard → TI-99/4A key matrix mapping.
//!
//! Maps winit `KeyCode` values to (column, row) positions for the windowed
//! binary. The matrix itself stays scancode-free; this is the one place
//! host keys become switch coordinates.

use winit::keyboard::KeyCode;

/// Map a host key to a matrix position.
///
/// Returns `None` for unmapped keys. Arrow keys and Tab drive joystick 1
/// (columns 6); FCTN is on Alt.
#[must_use]
pub fn map_keycode(key: KeyCode) -> Option<(u8, u8)> {
    match key {
        // Letters
        KeyCode::KeyA => Some((5, 5)),
        KeyCode::KeyB => Some((4, 7)),
        KeyCode::KeyC => Some((2, 7)),
        KeyCode::KeyD => Some((2, 5)),
        KeyCode::KeyE => Some((2, 6)),
        KeyCode::KeyF => Some((3, 5)),
        KeyCode::KeyG => Some((4, 5)),
        KeyCode::KeyH => Some((4, 1)),
        KeyCode::KeyI => Some((2, 2)),
        KeyCode::KeyJ => Some((3, 1)),
        KeyCode::KeyK => Some((2, 1)),
        KeyCode::KeyL => Some((1, 1)),
        KeyCode::KeyM => Some((3, 0)),
        KeyCode::KeyN => Some((4, 0)),
        KeyCode::KeyO => Some((1, 2)),
        KeyCode::KeyP => Some((5, 2)),
        KeyCode::KeyQ => Some((5, 6)),
        KeyCode::KeyR => Some((3, 6)),
        KeyCode::KeyS => Some((1, 5)),
        KeyCode::KeyT => Some((4, 6)),
        KeyCode::KeyU => Some((3, 2)),
        KeyCode::KeyV => Some((3, 7)),
        KeyCode::KeyW => Some((1, 6)),
        KeyCode::KeyX => Some((1, 7)),
        KeyCode::KeyY => Some((4, 2)),
        KeyCode::KeyZ => Some((5, 7)),

        // Digits
        KeyCode::Digit1 => Some((5, 4)),
        KeyCode::Digit2 => Some((1, 4)),
        KeyCode::Digit3 => Some((2, 4)),
        KeyCode::Digit4 => Some((3, 4)),
        KeyCode::Digit5 => Some((4, 4)),
        KeyCode::Digit6 => Some((4, 3)),
        KeyCode::Digit7 => Some((3, 3)),
        KeyCode::Digit8 => Some((2, 3)),
        KeyCode::Digit9 => Some((1, 3)),
        KeyCode::Digit0 => Some((5, 3)),

        // Modifiers
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Some((0, 5)),
        KeyCode::ControlLeft | KeyCode::ControlRight => Some((0, 6)),
        KeyCode::AltLeft | KeyCode::AltRight => Some((0, 4)),

        // Special keys
        KeyCode::Enter => Some((0, 2)),
        KeyCode::Space => Some((0, 1)),
        KeyCode::Equal => Some((0, 0)),

        // Punctuation
        KeyCode::Period => Some((1, 0)),
        KeyCode::Comma => Some((2, 0)),
        KeyCode::Slash => Some((5, 0)),
        KeyCode::Semicolon => Some((5, 1)),

        // Joystick 1 on the cursor cluster
        KeyCode::Tab => Some((6, 0)),
        KeyCode::ArrowLeft => Some((6, 1)),
        KeyCode::ArrowRight => Some((6, 2)),
        KeyCode::ArrowDown => Some((6, 3)),
        KeyCode::ArrowUp => Some((6, 4)),

        _ => None,
    }
}

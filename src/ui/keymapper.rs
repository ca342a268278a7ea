//! Key mapping for terminal input
//!
//! Converts key events to VT sequences for PTY input, following the mode
//! flags the interpreter last published.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventState, KeyModifiers};

use crate::core::term::{ModeSet, TerminalMode};

const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        result.set(Modifiers::SHIFT, mods.contains(KeyModifiers::SHIFT));
        result.set(Modifiers::CTRL, mods.contains(KeyModifiers::CONTROL));
        result.set(Modifiers::ALT, mods.contains(KeyModifiers::ALT));
        result
    }
}

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Map a key event to PTY bytes under `modes`
    pub fn map(event: &KeyEvent, modes: ModeSet) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        if event.state.contains(KeyEventState::KEYPAD) && modes.contains(TerminalMode::Keypad) {
            if let Some(bytes) = Self::keypad_key(event.code) {
                return Some(bytes);
            }
        }

        let bytes = match event.code {
            KeyCode::Char(ch) => Self::map_char(ch, mods, modes),
            KeyCode::Enter => {
                let enter: &[u8] = if modes.contains(TerminalMode::AutoNewLine) {
                    b"\r\n"
                } else {
                    b"\r"
                };
                Self::with_alt(enter, mods, modes)
            }
            KeyCode::Backspace => Self::with_alt(&[0x7f], mods, modes),
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => b"\x1b[Z".to_vec(),
            KeyCode::Tab => vec![0x09],
            KeyCode::BackTab => b"\x1b[Z".to_vec(),
            KeyCode::Esc => vec![0x1b],

            KeyCode::Up => Self::cursor_key(b'A', mods, modes),
            KeyCode::Down => Self::cursor_key(b'B', mods, modes),
            KeyCode::Right => Self::cursor_key(b'C', mods, modes),
            KeyCode::Left => Self::cursor_key(b'D', mods, modes),
            KeyCode::Home => Self::cursor_key(b'H', mods, modes),
            KeyCode::End => Self::cursor_key(b'F', mods, modes),

            KeyCode::PageUp => Self::tilde_key(5, mods),
            KeyCode::PageDown => Self::tilde_key(6, mods),
            KeyCode::Insert => Self::tilde_key(2, mods),
            KeyCode::Delete => Self::tilde_key(3, mods),
            KeyCode::F(n) => Self::function_key(n, mods)?,

            _ => return None,
        };
        Some(bytes)
    }

    /// Wrap pasted text in bracketed paste markers when the application asked for them
    pub fn encode_paste(text: &str, modes: ModeSet) -> Vec<u8> {
        if !modes.contains(TerminalMode::BracketedPasteMode) {
            return text.as_bytes().to_vec();
        }
        // An embedded end marker would let the paste escape the brackets
        let body = text.replace(PASTE_END, "");
        let mut bytes = Vec::with_capacity(body.len() + PASTE_START.len() + PASTE_END.len());
        bytes.extend_from_slice(PASTE_START.as_bytes());
        bytes.extend_from_slice(body.as_bytes());
        bytes.extend_from_slice(PASTE_END.as_bytes());
        bytes
    }

    fn map_char(ch: char, mods: Modifiers, modes: ModeSet) -> Vec<u8> {
        if mods.contains(Modifiers::CTRL) {
            if let Some(code) = Self::control_code(ch) {
                return Self::with_alt(&[code], mods, modes);
            }
        }
        let mut buf = [0; 4];
        Self::with_alt(ch.encode_utf8(&mut buf).as_bytes(), mods, modes)
    }

    /// Ctrl+key as a C0 control
    fn control_code(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1b),
            '\\' | '4' => Some(0x1c),
            ']' | '5' => Some(0x1d),
            '^' | '~' | '6' => Some(0x1e),
            '_' | '?' | '7' => Some(0x1f),
            _ => None,
        }
    }

    /// ESC prefix for Alt when the application enabled it
    fn with_alt(bytes: &[u8], mods: Modifiers, modes: ModeSet) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len() + 1);
        if mods.contains(Modifiers::ALT) && modes.contains(TerminalMode::AltSendsEscape) {
            out.push(0x1b);
        }
        out.extend_from_slice(bytes);
        out
    }

    /// Arrows, Home and End: SS3 in application cursor mode, CSI otherwise
    fn cursor_key(key: u8, mods: Modifiers, modes: ModeSet) -> Vec<u8> {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
        } else if modes.contains(TerminalMode::CursorKey) {
            vec![0x1b, b'O', key]
        } else {
            vec![0x1b, b'[', key]
        }
    }

    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, Self::modifier_code(mods)).into_bytes()
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        let bytes = match n {
            1..=4 => {
                let key = (b'P' + n - 1) as char;
                if mods.is_empty() {
                    format!("\x1bO{}", key)
                } else {
                    format!("\x1b[1;{}{}", Self::modifier_code(mods), key)
                }
            }
            5..=12 => {
                let code = [15, 17, 18, 19, 20, 21, 23, 24][(n - 5) as usize];
                if mods.is_empty() {
                    format!("\x1b[{}~", code)
                } else {
                    format!("\x1b[{};{}~", code, Self::modifier_code(mods))
                }
            }
            _ => return None,
        };
        Some(bytes.into_bytes())
    }

    /// Application keypad: SS3 sequences for the numeric pad
    fn keypad_key(code: KeyCode) -> Option<Vec<u8>> {
        let key = match code {
            KeyCode::Char(ch @ '0'..='9') => b'p' + (ch as u8 - b'0'),
            KeyCode::Char('*') => b'j',
            KeyCode::Char('+') => b'k',
            KeyCode::Char(',') => b'l',
            KeyCode::Char('-') => b'm',
            KeyCode::Char('.') => b'n',
            KeyCode::Char('/') => b'o',
            KeyCode::Char('=') => b'X',
            KeyCode::Enter => b'M',
            _ => return None,
        };
        Some(vec![0x1b, b'O', key])
    }

    /// xterm modifier parameter
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn keypad(code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind_and_state(
            code,
            KeyModifiers::NONE,
            crossterm::event::KeyEventKind::Press,
            KeyEventState::KEYPAD,
        )
    }

    #[test]
    fn test_char_keys() {
        let modes = ModeSet::empty();
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('a'), KeyModifiers::NONE), modes), Some(b"a".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('c'), KeyModifiers::CONTROL), modes), Some(vec![0x03]));
        assert_eq!(KeyMapper::map(&key(KeyCode::Char('é'), KeyModifiers::NONE), modes), Some("é".as_bytes().to_vec()));
    }

    #[test]
    fn test_alt_follows_mode() {
        let event = key(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event, ModeSet::empty()), Some(b"x".to_vec()));

        let modes = ModeSet::empty().with(TerminalMode::AltSendsEscape);
        assert_eq!(KeyMapper::map(&event, modes), Some(b"\x1bx".to_vec()));

        let event = key(KeyCode::Char('c'), KeyModifiers::ALT | KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event, modes), Some(vec![0x1b, 0x03]));
    }

    #[test]
    fn test_cursor_keys() {
        let up = key(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&up, ModeSet::empty()), Some(b"\x1b[A".to_vec()));

        let modes = ModeSet::empty().with(TerminalMode::CursorKey);
        assert_eq!(KeyMapper::map(&up, modes), Some(b"\x1bOA".to_vec()));
        assert_eq!(
            KeyMapper::map(&key(KeyCode::Home, KeyModifiers::NONE), modes),
            Some(b"\x1bOH".to_vec())
        );

        // Modified keys keep the CSI form
        let ctrl_up = key(KeyCode::Up, KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&ctrl_up, modes), Some(b"\x1b[1;5A".to_vec()));
    }

    #[test]
    fn test_enter_and_newline_mode() {
        let enter = key(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&enter, ModeSet::empty()), Some(b"\r".to_vec()));
        let modes = ModeSet::empty().with(TerminalMode::AutoNewLine);
        assert_eq!(KeyMapper::map(&enter, modes), Some(b"\r\n".to_vec()));
    }

    #[test]
    fn test_application_keypad() {
        let modes = ModeSet::empty().with(TerminalMode::Keypad);
        assert_eq!(KeyMapper::map(&keypad(KeyCode::Char('5')), modes), Some(b"\x1bOu".to_vec()));
        assert_eq!(KeyMapper::map(&keypad(KeyCode::Enter), modes), Some(b"\x1bOM".to_vec()));
        // Numeric keypad mode sends the plain character
        assert_eq!(
            KeyMapper::map(&keypad(KeyCode::Char('5')), ModeSet::empty()),
            Some(b"5".to_vec())
        );
    }

    #[test]
    fn test_function_keys() {
        let modes = ModeSet::empty();
        assert_eq!(KeyMapper::map(&key(KeyCode::F(1), KeyModifiers::NONE), modes), Some(b"\x1bOP".to_vec()));
        assert_eq!(KeyMapper::map(&key(KeyCode::F(5), KeyModifiers::NONE), modes), Some(b"\x1b[15~".to_vec()));
        assert_eq!(
            KeyMapper::map(&key(KeyCode::F(2), KeyModifiers::SHIFT), modes),
            Some(b"\x1b[1;2Q".to_vec())
        );
        assert_eq!(
            KeyMapper::map(&key(KeyCode::F(12), KeyModifiers::CONTROL), modes),
            Some(b"\x1b[24;5~".to_vec())
        );
        assert_eq!(KeyMapper::map(&key(KeyCode::F(13), KeyModifiers::NONE), modes), None);
    }

    #[test]
    fn test_paste() {
        assert_eq!(KeyMapper::encode_paste("ls\n", ModeSet::empty()), b"ls\n".to_vec());

        let modes = ModeSet::empty().with(TerminalMode::BracketedPasteMode);
        assert_eq!(
            KeyMapper::encode_paste("a\x1b[201~b", modes),
            b"\x1b[200~ab\x1b[201~".to_vec()
        );
    }
}

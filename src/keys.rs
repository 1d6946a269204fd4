//! Maps an abstract key event to the VT byte sequence a shell expects,
//! generalizing the teacher's `key_to_pty_bytes` lookup table to cover
//! application-cursor/application-keypad mode switching and xterm
//! modifier-encoded CSI/SS3 sequences.

use bitflags::bitflags;

use crate::terminal::Modes;

bitflags! {
    /// The modifier keys held down alongside a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyModifiers: u8 {
        const SHIFT   = 1 << 0;
        const ALT     = 1 << 1;
        const CONTROL = 1 << 2;
        const SUPER   = 1 << 3;
    }
}

/// USB HID keycodes for the keys the special-key table recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyCode {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Tab,
    Return,
    Escape,
    Backspace,
    /// Any key not covered above; `characters` carries the printable text.
    Other(u32),
}

impl KeyCode {
    /// The USB HID usage ID for the keyboard/keypad page, for keys the
    /// special-key table recognizes. `None` for [`KeyCode::Other`] — its
    /// raw code is carried in the variant itself.
    #[must_use]
    pub fn hid_usage_id(self) -> Option<u32> {
        Some(match self {
            Self::Up => 0x52,
            Self::Down => 0x51,
            Self::Left => 0x50,
            Self::Right => 0x4F,
            Self::Home => 0x4A,
            Self::End => 0x4D,
            Self::PageUp => 0x4B,
            Self::PageDown => 0x4E,
            Self::Insert => 0x49,
            Self::Delete => 0x4C,
            Self::F1 => 0x3A,
            Self::F2 => 0x3B,
            Self::F3 => 0x3C,
            Self::F4 => 0x3D,
            Self::F5 => 0x3E,
            Self::F6 => 0x3F,
            Self::F7 => 0x40,
            Self::F8 => 0x41,
            Self::F9 => 0x42,
            Self::F10 => 0x43,
            Self::F11 => 0x44,
            Self::F12 => 0x45,
            Self::Tab => 0x2B,
            Self::Return => 0x28,
            Self::Escape => 0x29,
            Self::Backspace => 0x2A,
            Self::Other(_) => return None,
        })
    }
}

/// An abstract key press/release, independent of any UI toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: KeyCode,
    pub modifiers: KeyModifiers,
    pub is_key_down: bool,
    pub characters: String,
}

/// Which escape-introducer form a special key's sequence uses before
/// application-cursor mode and modifier encoding are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// `ESC O <final>` in application-cursor mode, `ESC [ <final>` in
    /// normal mode; modified the same way either way.
    CursorKey(u8),
    /// `ESC [ <n> ~`, CSI with a numeric parameter and a tilde final.
    Tilde(u16),
}

fn special_key_form(code: KeyCode) -> Option<Form> {
    match code {
        KeyCode::Up => Some(Form::CursorKey(b'A')),
        KeyCode::Down => Some(Form::CursorKey(b'B')),
        KeyCode::Right => Some(Form::CursorKey(b'C')),
        KeyCode::Left => Some(Form::CursorKey(b'D')),
        KeyCode::Home => Some(Form::CursorKey(b'H')),
        KeyCode::End => Some(Form::CursorKey(b'F')),
        KeyCode::F1 => Some(Form::CursorKey(b'P')),
        KeyCode::F2 => Some(Form::CursorKey(b'Q')),
        KeyCode::F3 => Some(Form::CursorKey(b'R')),
        KeyCode::F4 => Some(Form::CursorKey(b'S')),
        KeyCode::Insert => Some(Form::Tilde(2)),
        KeyCode::Delete => Some(Form::Tilde(3)),
        KeyCode::PageUp => Some(Form::Tilde(5)),
        KeyCode::PageDown => Some(Form::Tilde(6)),
        KeyCode::F5 => Some(Form::Tilde(15)),
        KeyCode::F6 => Some(Form::Tilde(17)),
        KeyCode::F7 => Some(Form::Tilde(18)),
        KeyCode::F8 => Some(Form::Tilde(19)),
        KeyCode::F9 => Some(Form::Tilde(20)),
        KeyCode::F10 => Some(Form::Tilde(21)),
        KeyCode::F11 => Some(Form::Tilde(23)),
        KeyCode::F12 => Some(Form::Tilde(24)),
        KeyCode::Return | KeyCode::Escape | KeyCode::Backspace | KeyCode::Tab | KeyCode::Other(_) => {
            None
        }
    }
}

/// Keys whose "raw escape sequence" (step 5, no modifiers) is a bare
/// control byte rather than a multi-byte `ESC [ ...` sequence.
fn raw_bytes(code: KeyCode) -> Option<Vec<u8>> {
    match code {
        KeyCode::Return => Some(vec![b'\r']),
        KeyCode::Escape => Some(vec![0x1B]),
        KeyCode::Backspace => Some(vec![0x7F]),
        KeyCode::Tab => Some(vec![0x09]),
        _ => None,
    }
}

/// Fold a single character into its control-character byte, per the
/// Ctrl+key convention (Ctrl+A → 0x01, Ctrl+Space → 0x00, etc.).
fn control_fold(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some((c as u8 - b'a') + 1),
        'A'..='Z' => Some((c as u8 - b'A') + 1),
        '[' | '{' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' | '}' => Some(0x1D),
        '^' | '~' => Some(0x1E),
        '_' => Some(0x1F),
        '@' | ' ' => Some(0x00),
        _ => None,
    }
}

/// xterm modifier encoding: `1 + shift + 2*alt + 4*control + 8*super`.
fn xterm_modifier_code(modifiers: KeyModifiers) -> u8 {
    let mut code: u8 = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        code += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        code += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        code += 4;
    }
    if modifiers.contains(KeyModifiers::SUPER) {
        code += 8;
    }
    code
}

/// Encode one key event as the bytes to write to the remote shell's stdin.
///
/// `modes` supplies the current application-cursor mode (application-
/// keypad mode does not change any sequence this table emits, but is
/// threaded through for callers that want to branch on it themselves).
#[must_use]
pub fn encode(event: &KeyEvent, modes: Modes) -> Vec<u8> {
    if !event.is_key_down {
        return Vec::new();
    }

    if matches!(event.key_code, KeyCode::Tab) && event.modifiers == KeyModifiers::SHIFT {
        return b"\x1b[Z".to_vec();
    }

    let non_shift_modifiers = event.modifiers - KeyModifiers::SHIFT;

    if !event.characters.is_empty() && non_shift_modifiers.is_empty() {
        if let Some(bytes) = encode_special(event.key_code, event.modifiers, modes) {
            return bytes;
        }
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            if let Some(byte) = single_char(&event.characters).and_then(control_fold) {
                return vec![byte];
            }
        }
        return event.characters.clone().into_bytes();
    }

    if event.modifiers.contains(KeyModifiers::CONTROL) && !event.characters.is_empty() {
        if let Some(byte) = single_char(&event.characters).and_then(control_fold) {
            return vec![byte];
        }
    }

    if let Some(bytes) = encode_special(event.key_code, event.modifiers, modes) {
        return bytes;
    }

    if !event.characters.is_empty() {
        return event.characters.clone().into_bytes();
    }

    Vec::new()
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(c)
}

fn encode_special(code: KeyCode, modifiers: KeyModifiers, modes: Modes) -> Option<Vec<u8>> {
    if let Some(bytes) = raw_bytes(code) {
        return Some(bytes);
    }
    let form = special_key_form(code)?;

    let application_cursor = modes.contains(Modes::APPLICATION_CURSOR);

    Some(match form {
        Form::CursorKey(finale) => {
            if modifiers.is_empty() {
                let introducer: &[u8] = if application_cursor { b"\x1bO" } else { b"\x1b[" };
                let mut out = introducer.to_vec();
                out.push(finale);
                out
            } else {
                let mod_code = xterm_modifier_code(modifiers);
                format!("\x1b[1;{mod_code}{}", finale as char).into_bytes()
            }
        }
        Form::Tilde(n) => {
            if modifiers.is_empty() {
                format!("\x1b[{n}~").into_bytes()
            } else {
                let mod_code = xterm_modifier_code(modifiers);
                format!("\x1b[{n};{mod_code}~").into_bytes()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(code: KeyCode, modifiers: KeyModifiers, characters: &str) -> KeyEvent {
        KeyEvent {
            key_code: code,
            modifiers,
            is_key_down: true,
            characters: characters.to_string(),
        }
    }

    #[test]
    fn key_up_produces_no_bytes() {
        let mut event = down(KeyCode::Up, KeyModifiers::empty(), "");
        event.is_key_down = false;
        assert_eq!(encode(&event, Modes::default()), Vec::<u8>::new());
    }

    #[test]
    fn up_arrow_normal_and_application_cursor() {
        let event = down(KeyCode::Up, KeyModifiers::empty(), "");
        assert_eq!(encode(&event, Modes::default()), b"\x1b[A".to_vec());
        let app_modes = Modes::default() | Modes::APPLICATION_CURSOR;
        assert_eq!(encode(&event, app_modes), b"\x1bOA".to_vec());
    }

    #[test]
    fn f5_with_ctrl_shift_encodes_mod_six() {
        let event = down(
            KeyCode::F5,
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
            "",
        );
        assert_eq!(encode(&event, Modes::default()), b"\x1b[15;6~".to_vec());
    }

    #[test]
    fn ctrl_a_folds_to_0x01() {
        let event = down(KeyCode::Other(0), KeyModifiers::CONTROL, "a");
        assert_eq!(encode(&event, Modes::default()), vec![0x01]);
    }

    #[test]
    fn ctrl_space_folds_to_0x00() {
        let event = down(KeyCode::Other(0), KeyModifiers::CONTROL, " ");
        assert_eq!(encode(&event, Modes::default()), vec![0x00]);
    }

    #[test]
    fn shift_tab_emits_csi_z() {
        let event = down(KeyCode::Tab, KeyModifiers::SHIFT, "\t");
        assert_eq!(encode(&event, Modes::default()), b"\x1b[Z".to_vec());
    }

    #[test]
    fn plain_tab_emits_raw_tab_byte() {
        let event = down(KeyCode::Tab, KeyModifiers::empty(), "\t");
        assert_eq!(encode(&event, Modes::default()), b"\t".to_vec());
    }

    #[test]
    fn unknown_keycode_with_characters_falls_through_to_raw() {
        let event = down(KeyCode::Other(999), KeyModifiers::empty(), "q");
        assert_eq!(encode(&event, Modes::default()), b"q".to_vec());
    }

    #[test]
    fn unknown_keycode_with_no_characters_is_empty() {
        let event = down(KeyCode::Other(999), KeyModifiers::empty(), "");
        assert_eq!(encode(&event, Modes::default()), Vec::<u8>::new());
    }

    #[test]
    fn delete_key_tilde_form_with_modifier() {
        let event = down(KeyCode::Delete, KeyModifiers::SHIFT, "");
        assert_eq!(encode(&event, Modes::default()), b"\x1b[3;2~".to_vec());
    }

    #[test]
    fn backspace_emits_del_byte() {
        let event = down(KeyCode::Backspace, KeyModifiers::empty(), "\x7f");
        assert_eq!(encode(&event, Modes::default()), vec![0x7F]);
    }
}

//! The VT100/xterm escape-sequence parser.
//!
//! Tokenizing is delegated to [`vte`] — the same Paul Williams DEC ANSI
//! state machine Alacritty uses — while this module supplies the
//! [`vte::Perform`] implementation that actually mutates a
//! [`TerminalState`]. Malformed sequences are dropped silently (`vte`
//! signals this via its `ignore` flag); out-of-range CSI parameters are
//! clamped rather than rejected.

use vte::{Params, Perform};

use super::state::{EraseMode, TerminalState};

/// Drives a [`TerminalState`] from a byte stream via `vte`.
pub struct TerminalParser {
    parser: vte::Parser,
    pub state: TerminalState,
    replies: Vec<u8>,
}

impl TerminalParser {
    #[must_use]
    pub fn new(rows: usize, columns: usize, scrollback_capacity: usize) -> Self {
        Self {
            parser: vte::Parser::new(),
            state: TerminalState::new(rows, columns, scrollback_capacity),
            replies: Vec::new(),
        }
    }

    /// Feed a chunk of host output through the parser.
    pub fn feed(&mut self, bytes: &[u8]) {
        let mut performer = Performer {
            state: &mut self.state,
            replies: &mut self.replies,
        };
        for &byte in bytes {
            self.parser.advance(&mut performer, byte);
        }
    }

    /// Drain bytes queued by DSR/DA handling that must be sent back to the
    /// remote host.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }
}

struct Performer<'a> {
    state: &'a mut TerminalState,
    replies: &'a mut Vec<u8>,
}

/// Extract the leading value of each CSI parameter group, ignoring
/// colon-separated subparameters (not used by any sequence this parser
/// handles).
fn plain_params(params: &Params) -> Vec<u16> {
    params.iter().map(|group| group.first().copied().unwrap_or(0)).collect()
}

fn at(params: &[u16], index: usize, default: u16) -> u16 {
    params.get(index).copied().filter(|&v| v != 0).unwrap_or(default)
}

impl<'a> Perform for Performer<'a> {
    fn print(&mut self, c: char) {
        self.state.print(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => self.state.cursor_back(1),
            0x09 => self.state.advance_tab(),
            0x0A | 0x0B | 0x0C => {
                if self.state.modes.contains(super::modes::Modes::LINE_FEED_NEW_LINE) {
                    self.state.next_line();
                } else {
                    self.state.line_feed();
                }
            }
            0x0D => {
                self.state.active_mut().cursor.col = 0;
            }
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let private = intermediates.first() == Some(&b'?');
        let nums = plain_params(params);
        let n1 = |default: u16| at(&nums, 0, default) as usize;

        match action {
            'A' => self.state.cursor_up(n1(1).max(1)),
            'B' => self.state.cursor_down(n1(1).max(1)),
            'C' => self.state.cursor_forward(n1(1).max(1)),
            'D' => self.state.cursor_back(n1(1).max(1)),
            'E' => self.state.cursor_next_line(n1(1).max(1)),
            'F' => self.state.cursor_prev_line(n1(1).max(1)),
            'G' | '`' => self.state.cursor_column(n1(1).saturating_sub(1)),
            'd' => self.state.cursor_row(n1(1).saturating_sub(1)),
            'H' | 'f' => {
                let row = n1(1).saturating_sub(1);
                let col = at(&nums, 1, 1).saturating_sub(1) as usize;
                self.state.cursor_position(row, col);
            }
            'J' => match at(&nums, 0, 0) {
                3 => self.state.clear_scrollback(),
                m => {
                    if let Some(mode) = EraseMode::from_param(m) {
                        self.state.erase_in_display(mode);
                    }
                }
            },
            'K' => {
                if let Some(mode) = EraseMode::from_param(at(&nums, 0, 0)) {
                    self.state.erase_in_line(mode);
                }
            }
            'L' => self.state.insert_lines(n1(1).max(1)),
            'M' => self.state.delete_lines(n1(1).max(1)),
            'P' => self.state.delete_chars(n1(1).max(1)),
            '@' => self.state.insert_chars(n1(1).max(1)),
            'S' => self.state.scroll_up(n1(1).max(1)),
            'T' => self.state.scroll_down(n1(1).max(1)),
            'X' => self.state.erase_chars(n1(1).max(1)),
            'r' => {
                let rows = self.state.rows();
                let top = at(&nums, 0, 1).saturating_sub(1) as usize;
                let bottom = at(&nums, 1, rows as u16).saturating_sub(1) as usize;
                self.state.set_scroll_region(top, bottom);
            }
            'm' => self.state.apply_sgr(&nums),
            'n' => match at(&nums, 0, 0) {
                5 => self.replies.extend_from_slice(b"\x1b[0n"),
                6 => {
                    let screen = self.state.active();
                    let reply = format!("\x1b[{};{}R", screen.cursor.row + 1, screen.cursor.col + 1);
                    self.replies.extend_from_slice(reply.as_bytes());
                }
                _ => {}
            },
            'g' => match at(&nums, 0, 0) {
                0 => self.state.clear_tab_stop(),
                3 => self.state.clear_all_tab_stops(),
                _ => {}
            },
            's' if !private => self.state.save_cursor(),
            'u' if !private => self.state.restore_cursor(),
            'c' if intermediates.first() == Some(&b'>') => {
                self.replies.extend_from_slice(b"\x1b[>1;10;0c");
            }
            'c' if !private => self.replies.extend_from_slice(b"\x1b[?62;22c"),
            'h' | 'l' => {
                let set = action == 'h';
                if private {
                    for &mode in &nums {
                        apply_dec_private_mode(self.state, mode, set);
                    }
                } else {
                    for &mode in &nums {
                        apply_ansi_mode(self.state, mode, set);
                    }
                }
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            return;
        }
        match byte {
            b'D' => self.state.line_feed(),
            b'M' => self.state.reverse_index(),
            b'E' => self.state.next_line(),
            b'7' => self.state.save_cursor(),
            b'8' => self.state.restore_cursor(),
            b'c' => self.state.full_reset(),
            b'H' => self.state.set_tab_stop(),
            b'=' => self.state.modes.insert(super::modes::Modes::APPLICATION_KEYPAD),
            b'>' => self.state.modes.remove(super::modes::Modes::APPLICATION_KEYPAD),
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        let Some(&code) = params.first() else { return };
        match code {
            b"0" | b"1" | b"2" => {
                if let Some(title) = params.get(1) {
                    if let Ok(title) = std::str::from_utf8(title) {
                        self.state.set_title(title.to_string());
                    }
                }
            }
            // Clipboard (52) and palette queries (4/10/11/12): advisory,
            // left to the embedding application.
            _ => {}
        }
    }
}

fn apply_dec_private_mode(state: &mut TerminalState, mode: u16, set: bool) {
    use super::modes::Modes;
    match mode {
        1 => toggle(&mut state.modes, Modes::APPLICATION_CURSOR, set),
        6 => {
            toggle(&mut state.modes, Modes::ORIGIN, set);
            state.cursor_position(0, 0);
        }
        7 => toggle(&mut state.modes, Modes::AUTO_WRAP, set),
        25 => toggle(&mut state.modes, Modes::CURSOR_VISIBLE, set),
        47 => state.set_alternate_screen(set),
        1000 => toggle(&mut state.modes, Modes::MOUSE_BUTTON, set),
        1002 => toggle(&mut state.modes, Modes::MOUSE_ANY, set),
        1006 => toggle(&mut state.modes, Modes::MOUSE_SGR, set),
        1004 => toggle(&mut state.modes, Modes::FOCUS_EVENTS, set),
        1049 => {
            if set {
                state.enter_alternate_screen();
            } else {
                state.leave_alternate_screen();
            }
        }
        2004 => toggle(&mut state.modes, Modes::BRACKETED_PASTE, set),
        _ => {}
    }
}

fn apply_ansi_mode(state: &mut TerminalState, mode: u16, set: bool) {
    use super::modes::Modes;
    match mode {
        4 => toggle(&mut state.modes, Modes::INSERT, set),
        20 => toggle(&mut state.modes, Modes::LINE_FEED_NEW_LINE, set),
        _ => {}
    }
}

fn toggle(modes: &mut super::modes::Modes, flag: super::modes::Modes, set: bool) {
    if set {
        modes.insert(flag);
    } else {
        modes.remove(flag);
    }
}

//! `TerminalState`: the dual-screen terminal the VT parser mutates.
//!
//! Two independently owned [`TerminalScreenState`] values (primary and
//! alternate) plus an `ActiveScreen` selector — never a back-pointer from
//! one screen to the other, per the shared-mutable-screen design note.

use super::cell::{Attributes, TerminalColor};
use super::modes::Modes;
use super::screen::TerminalScreenState;
use super::scrollback::Scrollback;

/// Which of the two owned screens is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveScreen {
    Primary,
    Alternate,
}

/// Erase scope shared by ED (screen) and EL (line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    ToEnd,
    ToStart,
    All,
}

impl EraseMode {
    #[must_use]
    pub fn from_param(param: u16) -> Option<Self> {
        match param {
            0 => Some(EraseMode::ToEnd),
            1 => Some(EraseMode::ToStart),
            2 => Some(EraseMode::All),
            _ => None,
        }
    }
}

/// The full terminal: both screens, the active selector, global modes, and
/// scrollback.
#[derive(Debug)]
pub struct TerminalState {
    primary: TerminalScreenState,
    alternate: TerminalScreenState,
    active: ActiveScreen,
    pub modes: Modes,
    pub scrollback: Scrollback,
}

impl TerminalState {
    #[must_use]
    pub fn new(rows: usize, columns: usize, scrollback_capacity: usize) -> Self {
        Self {
            primary: TerminalScreenState::new(rows, columns),
            alternate: TerminalScreenState::new(rows, columns),
            active: ActiveScreen::Primary,
            modes: Modes::default(),
            scrollback: Scrollback::new(scrollback_capacity),
        }
    }

    #[must_use]
    pub fn active_screen(&self) -> ActiveScreen {
        self.active
    }

    #[must_use]
    pub fn active(&self) -> &TerminalScreenState {
        match self.active {
            ActiveScreen::Primary => &self.primary,
            ActiveScreen::Alternate => &self.alternate,
        }
    }

    #[must_use]
    pub fn active_mut(&mut self) -> &mut TerminalScreenState {
        match self.active {
            ActiveScreen::Primary => &mut self.primary,
            ActiveScreen::Alternate => &mut self.alternate,
        }
    }

    #[must_use]
    pub fn primary(&self) -> &TerminalScreenState {
        &self.primary
    }

    #[must_use]
    pub fn alternate(&self) -> &TerminalScreenState {
        &self.alternate
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.active().rows()
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.active().columns()
    }

    /// Resize both screens (the spec's screens are independently owned,
    /// but dimensions track the viewport together).
    pub fn resize(&mut self, rows: usize, columns: usize) {
        self.primary.resize(rows, columns);
        self.alternate.resize(rows, columns);
    }

    /// Full terminal reset (RIS, `ESC c`): both screens blanked, primary
    /// selected, default modes, scrollback cleared.
    pub fn full_reset(&mut self) {
        let (rows, columns) = (self.rows(), self.columns());
        self.primary = TerminalScreenState::new(rows, columns);
        self.alternate = TerminalScreenState::new(rows, columns);
        self.active = ActiveScreen::Primary;
        self.modes = Modes::default();
        self.scrollback.clear();
    }

    // --- Cursor movement -------------------------------------------------

    /// Print a single character at the cursor, auto-wrapping first if
    /// needed, then advance the cursor by one column.
    pub fn print(&mut self, ch: char) {
        let columns = self.columns();
        let auto_wrap = self.modes.contains(Modes::AUTO_WRAP);
        let screen = self.active_mut();
        if screen.cursor.col >= columns {
            if !auto_wrap {
                screen.cursor.col = columns - 1;
            } else {
                screen.cursor.col = 0;
                self.line_feed();
            }
        }
        let screen = self.active_mut();
        screen.write_at_cursor(ch);
        screen.cursor.col += 1;
    }

    /// Line feed (LF/VT/FF): scroll the region if at its bottom, else move
    /// down one row. Scrolling off the top of the primary screen with
    /// `scroll_top == 0` feeds the evicted line into scrollback.
    pub fn line_feed(&mut self) {
        let on_primary = self.active == ActiveScreen::Primary;
        let screen = self.active_mut();
        let (top, bottom, rows) = (screen.scroll_top, screen.scroll_bottom, screen.rows());
        if screen.cursor.row == bottom {
            let evicted = screen.scroll_up_region(top, bottom);
            if on_primary && top == 0 {
                self.scrollback.push(evicted);
            }
        } else if screen.cursor.row < rows - 1 {
            screen.cursor.row += 1;
        }
    }

    /// Reverse index (`ESC M`): scroll down if at the region's top, else
    /// move up one row.
    pub fn reverse_index(&mut self) {
        let screen = self.active_mut();
        let (top, bottom) = (screen.scroll_top, screen.scroll_bottom);
        if screen.cursor.row == top {
            screen.scroll_down_region(top, bottom);
        } else {
            screen.cursor.row = screen.cursor.row.saturating_sub(1);
        }
    }

    /// Next line (`ESC E`): carriage return then line feed.
    pub fn next_line(&mut self) {
        self.active_mut().cursor.col = 0;
        self.line_feed();
    }

    /// CUU/CUD: move the cursor up/down by `n`, clamped to the scroll
    /// region.
    pub fn cursor_up(&mut self, n: usize) {
        let screen = self.active_mut();
        screen.cursor.row = screen.cursor.row.saturating_sub(n).max(screen.scroll_top);
    }

    pub fn cursor_down(&mut self, n: usize) {
        let screen = self.active_mut();
        screen.cursor.row = (screen.cursor.row + n).min(screen.scroll_bottom);
    }

    /// CUF/CUB: move the cursor right/left by `n`, clamped to the screen.
    pub fn cursor_forward(&mut self, n: usize) {
        let screen = self.active_mut();
        let max = screen.columns() - 1;
        screen.cursor.col = (screen.cursor.col + n).min(max);
    }

    pub fn cursor_back(&mut self, n: usize) {
        let screen = self.active_mut();
        screen.cursor.col = screen.cursor.col.saturating_sub(n);
    }

    /// CNL/CPL: move `n` rows down/up and reset the column to 0.
    pub fn cursor_next_line(&mut self, n: usize) {
        self.cursor_down(n);
        self.active_mut().cursor.col = 0;
    }

    pub fn cursor_prev_line(&mut self, n: usize) {
        self.cursor_up(n);
        self.active_mut().cursor.col = 0;
    }

    /// CHA: set the column (0-based), clamped to `columns - 1`.
    pub fn cursor_column(&mut self, col: usize) {
        let screen = self.active_mut();
        let max = screen.columns() - 1;
        screen.cursor.col = col.min(max);
    }

    /// VPA: set the row (0-based), clamped to `rows - 1`.
    pub fn cursor_row(&mut self, row: usize) {
        let screen = self.active_mut();
        let max = screen.rows() - 1;
        screen.cursor.row = row.min(max);
    }

    /// CUP/HVP: set cursor position (0-based row/col), clamped to the
    /// screen. Respects origin mode by offsetting from `scroll_top` when
    /// set (spec clamps rather than rejects out-of-range input).
    pub fn cursor_position(&mut self, row: usize, col: usize) {
        let origin = self.modes.contains(Modes::ORIGIN);
        let screen = self.active_mut();
        let row_base = if origin { screen.scroll_top } else { 0 };
        let max_row = screen.rows() - 1;
        let max_col = screen.columns() - 1;
        screen.cursor.row = (row_base + row).min(max_row);
        screen.cursor.col = col.min(max_col);
    }

    // --- Erase ------------------------------------------------------------

    /// ED: erase within the screen per `mode`.
    pub fn erase_in_display(&mut self, mode: EraseMode) {
        let (row, col, rows, cols) = {
            let s = self.active();
            (s.cursor.row, s.cursor.col, s.rows(), s.columns())
        };
        let screen = self.active_mut();
        match mode {
            EraseMode::ToEnd => {
                if let Some(line) = screen.line_mut(row) {
                    line.clear_range(col, cols);
                }
                for r in row + 1..rows {
                    if let Some(line) = screen.line_mut(r) {
                        line.clear();
                    }
                }
            }
            EraseMode::ToStart => {
                if let Some(line) = screen.line_mut(row) {
                    line.clear_range(0, col + 1);
                }
                for r in 0..row {
                    if let Some(line) = screen.line_mut(r) {
                        line.clear();
                    }
                }
            }
            EraseMode::All => {
                for r in 0..rows {
                    if let Some(line) = screen.line_mut(r) {
                        line.clear();
                    }
                }
            }
        }
    }

    /// ED 3: clear scrollback.
    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
    }

    /// EL: erase within the current line per `mode`.
    pub fn erase_in_line(&mut self, mode: EraseMode) {
        let (row, col, cols) = {
            let s = self.active();
            (s.cursor.row, s.cursor.col, s.columns())
        };
        let screen = self.active_mut();
        let Some(line) = screen.line_mut(row) else { return };
        match mode {
            EraseMode::ToEnd => line.clear_range(col, cols),
            EraseMode::ToStart => line.clear_range(0, col + 1),
            EraseMode::All => line.clear(),
        }
    }

    /// ECH: erase `n` chars from the cursor without shifting.
    pub fn erase_chars(&mut self, n: usize) {
        let (row, col, cols) = {
            let s = self.active();
            (s.cursor.row, s.cursor.col, s.columns())
        };
        if let Some(line) = self.active_mut().line_mut(row) {
            line.clear_range(col, (col + n).min(cols));
        }
    }

    // --- Line/char insert-delete -------------------------------------------

    /// IL: insert `n` blank lines at the cursor row, within the scroll
    /// region; lines shifted off the bottom of the region are dropped. This
    /// is exactly a down-scroll of the region `[cursor_row, scroll_bottom]`.
    pub fn insert_lines(&mut self, n: usize) {
        let screen = self.active_mut();
        let (row, bottom) = (screen.cursor.row, screen.scroll_bottom);
        if row > bottom {
            return;
        }
        for _ in 0..n {
            screen.scroll_down_region(row, bottom);
        }
    }

    /// DL: delete `n` lines at the cursor row, within the scroll region;
    /// vacated lines at the bottom are blanked. This is exactly an
    /// up-scroll of the region `[cursor_row, scroll_bottom]`.
    pub fn delete_lines(&mut self, n: usize) {
        let screen = self.active_mut();
        let (row, bottom) = (screen.cursor.row, screen.scroll_bottom);
        if row > bottom {
            return;
        }
        for _ in 0..n {
            screen.scroll_up_region(row, bottom);
        }
    }

    /// DCH: delete `n` chars at the cursor, shifting left, padding right.
    pub fn delete_chars(&mut self, n: usize) {
        let (row, col) = {
            let s = self.active();
            (s.cursor.row, s.cursor.col)
        };
        let fill = self.blank_cell();
        if let Some(line) = self.active_mut().line_mut(row) {
            line.delete_chars(col, n, fill);
        }
    }

    /// ICH: insert `n` blanks at the cursor, shifting right.
    pub fn insert_chars(&mut self, n: usize) {
        let (row, col) = {
            let s = self.active();
            (s.cursor.row, s.cursor.col)
        };
        let fill = self.blank_cell();
        if let Some(line) = self.active_mut().line_mut(row) {
            line.insert_blanks(col, n, fill);
        }
    }

    fn blank_cell(&self) -> super::cell::TerminalCell {
        let s = self.active();
        super::cell::TerminalCell {
            character: ' ',
            fg: s.current_fg,
            bg: s.current_bg,
            attributes: Attributes::empty(),
        }
    }

    // --- Scroll region and scrolling ---------------------------------------

    /// SU: scroll the whole screen's region up by `n` (content moves up,
    /// new blank lines appear at the bottom).
    pub fn scroll_up(&mut self, n: usize) {
        let on_primary = self.active == ActiveScreen::Primary;
        let screen = self.active_mut();
        let (top, bottom) = (screen.scroll_top, screen.scroll_bottom);
        for _ in 0..n {
            let evicted = screen.scroll_up_region(top, bottom);
            if on_primary && top == 0 {
                self.scrollback.push(evicted);
            }
        }
    }

    /// SD: scroll the whole screen's region down by `n`.
    pub fn scroll_down(&mut self, n: usize) {
        let screen = self.active_mut();
        let (top, bottom) = (screen.scroll_top, screen.scroll_bottom);
        for _ in 0..n {
            screen.scroll_down_region(top, bottom);
        }
    }

    /// DECSTBM: set the scroll region `[top, bottom]` (0-based, inclusive)
    /// and move the cursor to the region's origin.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let screen = self.active_mut();
        let max = screen.rows() - 1;
        let top = top.min(max);
        let bottom = bottom.min(max).max(top);
        screen.scroll_top = top;
        screen.scroll_bottom = bottom;
        screen.cursor.row = top;
        screen.cursor.col = 0;
    }

    // --- Tab stops ----------------------------------------------------------

    /// HTS: set a tab stop at the cursor's column.
    pub fn set_tab_stop(&mut self) {
        let col = self.active().cursor.col;
        self.active_mut().tab_stops.insert(col);
    }

    /// TBC 0: clear the tab stop at the cursor's column.
    pub fn clear_tab_stop(&mut self) {
        let col = self.active().cursor.col;
        self.active_mut().tab_stops.remove(&col);
    }

    /// TBC 3: clear every tab stop.
    pub fn clear_all_tab_stops(&mut self) {
        self.active_mut().tab_stops.clear();
    }

    /// HT: advance to the next tab stop after the cursor, or the last
    /// column if none remain.
    pub fn advance_tab(&mut self) {
        let screen = self.active_mut();
        let next = screen
            .tab_stops
            .iter()
            .copied()
            .find(|&stop| stop > screen.cursor.col);
        screen.cursor.col = next.unwrap_or(screen.columns() - 1);
    }

    // --- Cursor save/restore -------------------------------------------------

    pub fn save_cursor(&mut self) {
        let cursor = self.active().cursor;
        self.active_mut().saved_cursor = Some(cursor);
    }

    pub fn restore_cursor(&mut self) {
        if let Some(cursor) = self.active().saved_cursor {
            self.active_mut().cursor = cursor;
        }
    }

    // --- Alternate screen ------------------------------------------------

    /// Mode 1049: save cursor, switch to alternate, reset it.
    pub fn enter_alternate_screen(&mut self) {
        if self.active == ActiveScreen::Alternate {
            return;
        }
        self.save_cursor();
        self.active = ActiveScreen::Alternate;
        let (rows, columns) = (self.alternate.rows(), self.alternate.columns());
        self.alternate = TerminalScreenState::new(rows, columns);
        self.modes.insert(Modes::ALTERNATE_SCREEN);
    }

    /// Mode 1049 reset: switch to primary, restore its saved cursor.
    pub fn leave_alternate_screen(&mut self) {
        if self.active == ActiveScreen::Primary {
            return;
        }
        self.active = ActiveScreen::Primary;
        self.restore_cursor();
        self.modes.remove(Modes::ALTERNATE_SCREEN);
    }

    /// Legacy mode 47: switch screens without touching the cursor.
    pub fn set_alternate_screen(&mut self, enabled: bool) {
        if enabled {
            self.active = ActiveScreen::Alternate;
        } else {
            self.active = ActiveScreen::Primary;
        }
    }

    // --- SGR ---------------------------------------------------------------

    /// Apply one already-extracted SGR field (handles the `38;5;n` /
    /// `38;2;r;g;b` extended color sub-grammar by consuming further items
    /// from `rest`).
    pub fn apply_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.reset_sgr();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            let code = params[i];
            match code {
                0 => self.reset_sgr(),
                1 => self.active_mut().current_attributes.insert(Attributes::BOLD),
                2 => self.active_mut().current_attributes.insert(Attributes::DIM),
                3 => self.active_mut().current_attributes.insert(Attributes::ITALIC),
                4 => self.active_mut().current_attributes.insert(Attributes::UNDERLINE),
                5 | 6 => self.active_mut().current_attributes.insert(Attributes::BLINK),
                7 => self.active_mut().current_attributes.insert(Attributes::INVERSE),
                8 => self.active_mut().current_attributes.insert(Attributes::HIDDEN),
                9 => self.active_mut().current_attributes.insert(Attributes::STRIKETHROUGH),
                21 => {
                    self.active_mut().current_attributes.remove(Attributes::BOLD);
                }
                22 => {
                    let attrs = &mut self.active_mut().current_attributes;
                    attrs.remove(Attributes::BOLD);
                    attrs.remove(Attributes::DIM);
                }
                23 => self.active_mut().current_attributes.remove(Attributes::ITALIC),
                24 => self.active_mut().current_attributes.remove(Attributes::UNDERLINE),
                25 => self.active_mut().current_attributes.remove(Attributes::BLINK),
                27 => self.active_mut().current_attributes.remove(Attributes::INVERSE),
                28 => self.active_mut().current_attributes.remove(Attributes::HIDDEN),
                29 => self.active_mut().current_attributes.remove(Attributes::STRIKETHROUGH),
                30..=37 => self.active_mut().current_fg = TerminalColor::Indexed((code - 30) as u8),
                39 => self.active_mut().current_fg = TerminalColor::Default,
                40..=47 => self.active_mut().current_bg = TerminalColor::Indexed((code - 40) as u8),
                49 => self.active_mut().current_bg = TerminalColor::Default,
                90..=97 => self.active_mut().current_fg = TerminalColor::Indexed((code - 90 + 8) as u8),
                100..=107 => self.active_mut().current_bg = TerminalColor::Indexed((code - 100 + 8) as u8),
                38 | 48 => {
                    let (color, consumed) = parse_extended_color(&params[i + 1..]);
                    if let Some(color) = color {
                        if code == 38 {
                            self.active_mut().current_fg = color;
                        } else {
                            self.active_mut().current_bg = color;
                        }
                    }
                    i += consumed;
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn reset_sgr(&mut self) {
        let screen = self.active_mut();
        screen.current_attributes = Attributes::empty();
        screen.current_fg = TerminalColor::Default;
        screen.current_bg = TerminalColor::Default;
    }

    // --- OSC -----------------------------------------------------------------

    /// OSC 0/1/2: set the active screen's title.
    pub fn set_title(&mut self, title: String) {
        self.active_mut().title = title;
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.active().title
    }
}

/// Parse `38;5;n` / `38;2;r;g;b`-style extended color parameters (the part
/// after the leading `38`/`48`), returning the resolved color and how many
/// additional parameters were consumed.
fn parse_extended_color(rest: &[u16]) -> (Option<TerminalColor>, usize) {
    match rest.first() {
        Some(5) => match rest.get(1) {
            Some(&n) => (Some(TerminalColor::Indexed(n as u8)), 2),
            None => (None, 1),
        },
        Some(2) => {
            if rest.len() >= 4 {
                let r = rest[1] as u8;
                let g = rest[2] as u8;
                let b = rest[3] as u8;
                (Some(TerminalColor::Rgb(r, g, b)), 4)
            } else {
                (None, rest.len())
            }
        }
        _ => (None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(state: &mut TerminalState, s: &str) {
        for ch in s.chars() {
            match ch {
                '\r' => state.active_mut().cursor.col = 0,
                '\n' => state.line_feed(),
                _ => state.print(ch),
            }
        }
    }

    #[test]
    fn hello_world_two_lines() {
        let mut state = TerminalState::new(24, 80, 100);
        feed_str(&mut state, "Hello\r\nWorld");
        let row0: String = state.active().line(0).unwrap().cells()[..5]
            .iter()
            .map(|c| c.character)
            .collect();
        let row1: String = state.active().line(1).unwrap().cells()[..5]
            .iter()
            .map(|c| c.character)
            .collect();
        assert_eq!(row0, "Hello");
        assert_eq!(row1, "World");
        assert_eq!(state.active().cursor.row, 1);
        assert_eq!(state.active().cursor.col, 5);
    }

    #[test]
    fn scrollback_grows_by_one_on_overflow() {
        let mut state = TerminalState::new(24, 80, 100);
        for i in 0..25 {
            feed_str(&mut state, &format!("line{i}"));
            state.line_feed();
            state.active_mut().cursor.col = 0;
        }
        assert_eq!(state.scrollback.len(), 1);
        let first: String = state.scrollback.get(0).unwrap().cells()[..5]
            .iter()
            .map(|c| c.character)
            .collect();
        assert_eq!(first, "line0");
    }

    #[test]
    fn cup_clamps_out_of_range() {
        let mut state = TerminalState::new(24, 80, 10);
        state.cursor_position(998, 998);
        assert_eq!(state.active().cursor.row, 23);
        assert_eq!(state.active().cursor.col, 79);
    }

    #[test]
    fn alternate_screen_roundtrip_restores_cursor() {
        let mut state = TerminalState::new(24, 80, 10);
        feed_str(&mut state, "A");
        state.enter_alternate_screen();
        feed_str(&mut state, "B");
        state.leave_alternate_screen();
        feed_str(&mut state, "C");

        let primary_row0: String = state.primary().line(0).unwrap().cells()[..2]
            .iter()
            .map(|c| c.character)
            .collect();
        assert_eq!(primary_row0, "AC");
        let alt_row0: String = state.alternate().line(0).unwrap().cells()[..1]
            .iter()
            .map(|c| c.character)
            .collect();
        assert_eq!(alt_row0, "B");
    }

    #[test]
    fn sgr_indexed_colors_and_reset() {
        let mut state = TerminalState::new(5, 5, 0);
        state.apply_sgr(&[31]);
        state.print('R');
        state.apply_sgr(&[0]);
        state.print('N');
        let line = state.active().line(0).unwrap();
        assert_eq!(line.cell(0).unwrap().fg, TerminalColor::Indexed(1));
        assert_eq!(line.cell(1).unwrap().fg, TerminalColor::Default);
        assert!(line.cell(1).unwrap().attributes.is_empty());
    }

    #[test]
    fn sgr_true_color_extended_sequence() {
        let mut state = TerminalState::new(5, 5, 0);
        state.apply_sgr(&[38, 2, 10, 20, 30]);
        assert_eq!(state.active().current_fg, TerminalColor::Rgb(10, 20, 30));
    }

    #[test]
    fn insert_and_delete_lines() {
        let mut state = TerminalState::new(4, 3, 0);
        for i in 0..4u8 {
            state.active_mut().cursor.row = i as usize;
            state.active_mut().cursor.col = 0;
            state.print((b'a' + i) as char);
        }
        state.active_mut().cursor.row = 1;
        state.insert_lines(1);
        assert_eq!(state.active().line(1).unwrap().cell(0).unwrap().character, ' ');
        assert_eq!(state.active().line(2).unwrap().cell(0).unwrap().character, 'b');

        state.delete_lines(1);
        assert_eq!(state.active().line(1).unwrap().cell(0).unwrap().character, 'b');
    }
}

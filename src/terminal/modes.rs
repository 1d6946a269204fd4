//! Terminal-wide mode bitset (DEC private modes plus a couple of ANSI
//! ones), independent of which screen is active.

use bitflags::bitflags;

bitflags! {
    /// Modes that affect how the parser and key encoder behave, as
    /// opposed to per-cell attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modes: u16 {
        const AUTO_WRAP            = 1 << 0;
        const CURSOR_VISIBLE       = 1 << 1;
        const APPLICATION_KEYPAD   = 1 << 2;
        const APPLICATION_CURSOR   = 1 << 3;
        const ORIGIN               = 1 << 4;
        const INSERT               = 1 << 5;
        const LINE_FEED_NEW_LINE   = 1 << 6;
        const ALTERNATE_SCREEN     = 1 << 7;
        const MOUSE_BUTTON         = 1 << 8;
        const MOUSE_ANY            = 1 << 9;
        const MOUSE_SGR            = 1 << 10;
        const FOCUS_EVENTS         = 1 << 11;
        const BRACKETED_PASTE      = 1 << 12;
    }
}

impl Default for Modes {
    fn default() -> Self {
        Modes::AUTO_WRAP | Modes::CURSOR_VISIBLE
    }
}

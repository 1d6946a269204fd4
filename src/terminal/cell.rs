//! Cell-level data: color, attributes, and the single terminal cell they
//! decorate.

use bitflags::bitflags;

/// A cell's foreground or background color.
///
/// Mirrors the teacher corpus's small-enum-plus-constructor idiom for
/// closed color spaces (indexed ANSI/xterm-256 vs. true color).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalColor {
    /// The terminal's default foreground/background.
    #[default]
    Default,
    /// One of the 256 indexed ANSI/xterm colors.
    Indexed(u8),
    /// A 24-bit true color.
    Rgb(u8, u8, u8),
}

bitflags! {
    /// Per-cell SGR attribute flags.
    ///
    /// `HIDDEN` is tracked but never consulted on the feed path — renderers
    /// decide whether to honor it (see the open question in the design
    /// notes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attributes: u16 {
        const BOLD          = 1 << 0;
        const DIM           = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const BLINK         = 1 << 4;
        const INVERSE       = 1 << 5;
        const HIDDEN        = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
        const WIDE          = 1 << 8;
        const WIDE_TAIL     = 1 << 9;
    }
}

/// A single cell in the terminal's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCell {
    /// The displayed character. A blank cell is `' '`.
    pub character: char,
    pub fg: TerminalColor,
    pub bg: TerminalColor,
    pub attributes: Attributes,
}

impl TerminalCell {
    /// A blank cell with default colors and no attributes.
    pub const BLANK: TerminalCell = TerminalCell {
        character: ' ',
        fg: TerminalColor::Default,
        bg: TerminalColor::Default,
        attributes: Attributes::empty(),
    };
}

impl Default for TerminalCell {
    fn default() -> Self {
        Self::BLANK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cell_is_space_with_no_attributes() {
        let cell = TerminalCell::default();
        assert_eq!(cell.character, ' ');
        assert_eq!(cell.fg, TerminalColor::Default);
        assert_eq!(cell.bg, TerminalColor::Default);
        assert!(cell.attributes.is_empty());
    }

    #[test]
    fn attributes_combine_and_clear() {
        let mut attrs = Attributes::BOLD | Attributes::UNDERLINE;
        assert!(attrs.contains(Attributes::BOLD));
        attrs.remove(Attributes::BOLD);
        assert!(!attrs.contains(Attributes::BOLD));
        assert!(attrs.contains(Attributes::UNDERLINE));
    }
}

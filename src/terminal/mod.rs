//! Terminal emulation: the cell/line/screen data model, its top-level
//! dual-screen state, and the VT100/xterm escape-sequence parser that
//! drives it.

pub mod cell;
pub mod line;
pub mod modes;
pub mod parser;
pub mod screen;
pub mod scrollback;
pub mod state;

pub use cell::{Attributes, TerminalCell, TerminalColor};
pub use line::TerminalLine;
pub use modes::Modes;
pub use parser::TerminalParser;
pub use screen::{Cursor, TerminalScreenState};
pub use scrollback::Scrollback;
pub use state::{ActiveScreen, EraseMode, TerminalState};

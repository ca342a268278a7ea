//! Terminal model and VT interpreter.
//!
//! - **color** / **style**: colors and text styles attached to cells
//! - **mode**: mode flags and their side effects
//! - **columns**: buffer/visual column conversion
//! - **state**: screen buffers, cursors, scroll region
//! - **parser**: escape sequence state machine

pub mod color;
pub mod columns;
pub mod mode;
pub mod parser;
pub mod state;
pub mod style;

pub use color::{ColorError, ColorRole, Rgb, TerminalColor};
pub use columns::{LineCells, DWC};
pub use mode::{ModeHandle, ModeSet, SharedModes, TerminalMode};
pub use parser::{Response, VtParser};
pub use state::{Cell, Row, TerminalState};
pub use style::{StyleOptions, TextStyle, TextStyleBuilder};

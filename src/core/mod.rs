//! Core terminal emulation components.
//!
//! - **stream**: grapheme-safe character stream between PTY reader and interpreter
//! - **term**: terminal state, mode registry, styles and escape sequence parser
//! - **session**: reader and interpreter threads around one terminal
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── reader thread:      Read -> UTF-8 decoder -> StreamWriter
//! └── interpreter thread: DataStream -> VtParser -> TerminalState
//!                                                   ├── ScreenBuffer (cells + styles)
//!                                                   ├── CursorState
//!                                                   └── ModeSet
//! ```

pub mod session;
pub mod stream;
pub mod term;

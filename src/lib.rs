//! termcore - terminal emulation core
//!
//! Turns the character stream of a pseudo-terminal into a styled screen model.
//!
//! # Features
//!
//! - **Data stream**: producer/consumer stream that never splits a grapheme
//!   cluster, with latency, balanced and throughput refill policies
//! - **Mode registry**: DEC private and ANSI modes with their side effects
//! - **Colors and styles**: interned palette colors, deferred palette roles,
//!   immutable text styles
//! - **Column model**: buffer/visual column conversion over wide glyphs and
//!   emoji sequences
//!
//! # Example
//!
//! ```
//! use termcore::core::session::{Session, SessionOptions};
//!
//! let mut session = Session::new(1, SessionOptions::default());
//! session.feed(b"\x1b[1mhello\x1b[0m \xe4\xb8\xad");
//! let state = session.state();
//! let state = state.lock();
//! assert_eq!(state.active_screen().rows[0].text(), "hello 中");
//! ```

pub mod config;
pub mod core;
pub mod ui;

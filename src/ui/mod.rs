//! Rendering and input handling.
//!
//! - **colors**: palette-aware color conversion with caching
//! - **renderer**: styled and debug screen output
//! - **keymapper**: keyboard input to PTY byte sequence mapping

pub mod colors;
pub mod keymapper;
pub mod renderer;

pub use colors::ColorCache;
pub use keymapper::{KeyMapper, Modifiers};
pub use renderer::{DebugRenderer, Renderer};

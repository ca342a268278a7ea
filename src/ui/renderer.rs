//! Terminal renderer using crossterm
//!
//! Writes the terminal state to any output with styles, or as a plain debug
//! dump.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::{
    queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};

use super::colors::ColorCache;
use crate::config::Palette;
use crate::core::term::columns;
use crate::core::term::{StyleOptions, TerminalState, TextStyle};

/// Styled screen renderer
pub struct Renderer {
    colors: ColorCache,
    palette: Arc<Palette>,
    /// Print text only
    plain: bool,
}

impl Renderer {
    pub fn new(colors: ColorCache, palette: Arc<Palette>) -> Self {
        Self {
            colors,
            palette,
            plain: false,
        }
    }

    pub fn plain(mut self, plain: bool) -> Self {
        self.plain = plain;
        self
    }

    /// Write the active screen, one line per row
    pub fn render<W: Write>(&self, out: &mut W, state: &TerminalState) -> io::Result<()> {
        let screen = state.active_screen();
        let mut run = String::with_capacity(256);

        for row in &screen.rows {
            let mut current: Option<&TextStyle> = None;
            // Trailing blanks carry no information
            let used = row
                .cells
                .iter()
                .rposition(|cell| cell.ch != ' ' || cell.style.background().is_some())
                .map_or(0, |last| last + 1);

            for (col, cell) in row.cells[..used].iter().enumerate() {
                if cell.is_continuation() {
                    continue;
                }
                if current != Some(&cell.style) && !run.is_empty() {
                    self.write_run(out, current, &run)?;
                    run.clear();
                }
                current = Some(&cell.style);
                if cell.style.has_option(StyleOptions::HIDDEN) {
                    // Blank out the glyph's full width, nothing for attached slots
                    let previous = col.checked_sub(1).map(|prev| row.cells[prev].ch);
                    if !columns::extends_previous(previous, cell.ch) {
                        let width = columns::character_visual_width(row, col, row.cells.len());
                        run.extend(std::iter::repeat(' ').take(width));
                    }
                } else {
                    run.push(cell.ch);
                }
            }

            if !run.is_empty() {
                self.write_run(out, current, &run)?;
                run.clear();
            }
            if !self.plain {
                queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
            }
            queue!(out, Print('\n'))?;
        }

        out.flush()
    }

    fn write_run<W: Write>(&self, out: &mut W, style: Option<&TextStyle>, text: &str) -> io::Result<()> {
        if let (Some(style), false) = (style, self.plain) {
            self.apply_style(out, style)?;
        }
        queue!(out, Print(text))
    }

    fn apply_style<W: Write>(&self, out: &mut W, style: &TextStyle) -> io::Result<()> {
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

        let attributes = [
            (StyleOptions::BOLD, Attribute::Bold),
            (StyleOptions::DIM, Attribute::Dim),
            (StyleOptions::ITALIC, Attribute::Italic),
            (StyleOptions::UNDERLINE, Attribute::Underlined),
            (StyleOptions::SLOW_BLINK, Attribute::SlowBlink),
            (StyleOptions::RAPID_BLINK, Attribute::RapidBlink),
            (StyleOptions::INVERSE, Attribute::Reverse),
        ];
        for (option, attribute) in attributes {
            if style.has_option(option) {
                queue!(out, SetAttribute(attribute))?;
            }
        }

        if let Some(color) = style.foreground() {
            queue!(out, SetForegroundColor(self.colors.convert_color(color, &self.palette)))?;
        }
        if let Some(color) = style.background() {
            queue!(out, SetBackgroundColor(self.colors.convert_color(color, &self.palette)))?;
        }
        Ok(())
    }
}

/// Simple debug renderer that outputs to a string
pub struct DebugRenderer;

impl DebugRenderer {
    /// Render state to string (for debugging)
    pub fn render(state: &TerminalState) -> String {
        let screen = state.active_screen();
        let cursor = state.active_cursor();
        let mut output = String::new();

        output.push_str(&format!("=== Terminal {}x{} ===\n", state.cols, state.rows));
        output.push_str(&format!(
            "Cursor: ({}, {}) visible={} shape={:?}\n",
            cursor.col,
            cursor.row,
            cursor.visible,
            cursor.shape
        ));
        output.push_str(&format!("Title: {}\n", state.title));
        output.push_str(&format!("Alternate: {}\n", state.using_alternate));
        output.push_str(&format!("Modes: {:?}\n", state.modes));
        output.push_str(&format!("Scrollback: {} lines\n", screen.scrollback.len()));
        output.push_str("─".repeat(state.cols as usize).as_str());
        output.push('\n');

        for (row_idx, row) in screen.rows.iter().enumerate() {
            let indicator = if row_idx == cursor.row as usize { '>' } else { ' ' };
            output.push(indicator);

            for (col_idx, cell) in row.cells.iter().enumerate() {
                if cell.is_continuation() {
                    continue;
                }
                let at_cursor = row_idx == cursor.row as usize && col_idx == cursor.col as usize;
                output.push(if at_cursor && cursor.visible { '█' } else { cell.ch });
            }

            output.push('\n');
        }

        output.push_str("─".repeat(state.cols as usize).as_str());
        output.push('\n');

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorDepth;
    use crate::core::term::VtParser;
    use pretty_assertions::assert_eq;

    fn state_with(text: &str) -> TerminalState {
        let mut state = TerminalState::new(10, 3);
        VtParser::new().feed_str(text, &mut state);
        state
    }

    fn render(state: &TerminalState, plain: bool) -> String {
        let cache = ColorCache::new(ColorDepth::TrueColor);
        let palette = cache.apply_palette(Ok::<_, String>(Palette::default()));
        let renderer = Renderer::new(cache, palette).plain(plain);
        let mut out = Vec::new();
        renderer.render(&mut out, state).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_render() {
        let state = state_with("ab\x1b[31mc\r\n中x");
        assert_eq!(render(&state, true), "abc\n中x\n\n");
    }

    #[test]
    fn test_styled_render() {
        let state = state_with("\x1b[1;38;2;1;2;3mA");
        let out = render(&state, false);
        assert!(out.contains("\x1b[1m"));
        assert!(out.contains("\x1b[38;2;1;2;3m"));
        assert!(out.contains('A'));
    }

    #[test]
    fn test_hidden_cells_blank() {
        let state = state_with("a\x1b[8mb\x1b[28mc");
        assert_eq!(render(&state, true), "a c\n\n\n");

        // Wide glyphs keep their two columns, combining marks add none
        let state = state_with("a\x1b[8m\u{4E2D}e\u{301}\x1b[28mc");
        assert_eq!(render(&state, true), "a   c\n\n\n");
    }

    #[test]
    fn test_debug_render() {
        let state = state_with("\x1b]0;t\x07hi");
        let dump = DebugRenderer::render(&state);
        assert!(dump.starts_with("=== Terminal 10x3 ===\n"));
        assert!(dump.contains("Title: t\n"));
        assert!(dump.contains(">hi█"));
    }
}

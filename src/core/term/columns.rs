//! Buffer/visual column conversion
//!
//! A line is a flat array of slots, one scalar per slot. Some slots are
//! structural and take no screen column of their own:
//! - the double-width continuation marker [`DWC`]
//! - variation selectors, ZWJ and skin-tone modifiers
//! - gender symbols joined by a preceding ZWJ
//! - any other zero-width combining scalar
//!
//! Every other slot leads a grapheme that is one column wide, or two when a
//! `DWC` closes it.

use unicode_width::UnicodeWidthChar;

/// Double-width continuation marker, placed after a wide glyph
pub const DWC: char = '\u{E000}';

const ZWJ: char = '\u{200D}';
const VS15: char = '\u{FE0E}';
const VS16: char = '\u{FE0F}';

/// Read access to a line's slots
pub trait LineCells {
    /// Scalar in slot `index`, `None` past the end of the line
    fn slot(&self, index: usize) -> Option<char>;
}

impl LineCells for [char] {
    fn slot(&self, index: usize) -> Option<char> {
        self.get(index).copied()
    }
}

impl LineCells for Vec<char> {
    fn slot(&self, index: usize) -> Option<char> {
        self.get(index).copied()
    }
}

/// Whether `ch` attaches to the grapheme before it, given the scalar in the
/// preceding slot.
pub fn extends_previous(previous: Option<char>, ch: char) -> bool {
    match ch {
        DWC | VS15 | VS16 | ZWJ => true,
        '\u{1F3FB}'..='\u{1F3FF}' => true,
        '\u{2640}' | '\u{2642}' => previous == Some(ZWJ),
        ch => !ch.is_control() && ch.width() == Some(0),
    }
}

fn is_structural<L: LineCells + ?Sized>(line: &L, col: usize) -> bool {
    match line.slot(col) {
        Some(ch) => {
            let previous = col.checked_sub(1).and_then(|c| line.slot(c));
            extends_previous(previous, ch)
        }
        None => false,
    }
}

/// Visual width (1 or 2) of the grapheme leading at `col`.
pub fn character_visual_width<L: LineCells + ?Sized>(line: &L, col: usize, width: usize) -> usize {
    let mut next = col + 1;
    while next < width {
        match line.slot(next) {
            Some(DWC) => return 2,
            Some(_) if is_structural(line, next) => next += 1,
            _ => break,
        }
    }
    1
}

/// Visual column at which buffer offset `buffer_col` starts.
pub fn buffer_col_to_visual_col<L: LineCells + ?Sized>(
    line: &L,
    buffer_col: usize,
    width: usize,
) -> usize {
    (0..buffer_col.min(width))
        .filter(|&col| !is_structural(line, col))
        .map(|col| character_visual_width(line, col, width))
        .sum()
}

/// Buffer offset of the grapheme covering `visual_col`.
///
/// Columns inside a wide glyph snap to its leading slot. Past the end of the
/// line the result is `width`.
pub fn visual_col_to_buffer_col<L: LineCells + ?Sized>(
    line: &L,
    visual_col: usize,
    width: usize,
) -> usize {
    let mut visual = 0;
    for col in 0..width {
        if is_structural(line, col) {
            continue;
        }
        let span = character_visual_width(line, col, width);
        if visual_col < visual + span {
            return col;
        }
        visual += span;
    }
    width
}

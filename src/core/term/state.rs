//! Terminal state management
//!
//! Screen buffers, cursors, the current style and mode flags of one terminal.
//! Every cell slot holds one scalar. A wide glyph is followed by a [`DWC`]
//! slot; zero-width scalars take their own slot after the glyph they modify.

use std::collections::{HashSet, VecDeque};

use tracing::trace;
use unicode_width::UnicodeWidthChar;

use super::columns::{self, LineCells, DWC};
use super::mode::{ModeHandle, ModeSet, TerminalMode};
use super::style::TextStyle;

pub const DEFAULT_SCROLLBACK_LIMIT: usize = 10_000;

/// Terminal state holding all screen data
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub primary_screen: ScreenBuffer,
    pub alternate_screen: ScreenBuffer,
    pub using_alternate: bool,
    pub primary_cursor: CursorState,
    pub alternate_cursor: CursorState,
    /// Style applied to newly printed cells
    pub style: TextStyle,
    pub modes: ModeSet,
    pub title: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
    scrollback_limit: usize,
    render_suspended: bool,
    flush_requested: bool,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK_LIMIT)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            cols,
            rows,
            primary_screen: ScreenBuffer::new(cols, rows, scrollback_limit),
            alternate_screen: ScreenBuffer::new(cols, rows, 0),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            style: TextStyle::EMPTY,
            modes: ModeSet::empty()
                .with(TerminalMode::AutoWrap)
                .with(TerminalMode::CursorVisible),
            title: String::new(),
            scroll_region: (0, rows.saturating_sub(1)),
            scrollback_limit,
            render_suspended: false,
            flush_requested: false,
        }
    }

    pub fn active_screen(&self) -> &ScreenBuffer {
        if self.using_alternate {
            &self.alternate_screen
        } else {
            &self.primary_screen
        }
    }

    pub fn active_screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.using_alternate {
            &mut self.alternate_screen
        } else {
            &mut self.primary_screen
        }
    }

    pub fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    pub fn is_render_suspended(&self) -> bool {
        self.render_suspended
    }

    /// Whether a render is due. Clears the pending flags.
    ///
    /// Always false while synchronized update holds rendering back.
    pub fn take_render_request(&mut self) -> bool {
        if self.render_suspended {
            return false;
        }
        let flush = std::mem::take(&mut self.flush_requested);
        let primary = self.primary_screen.take_changed();
        let alternate = self.alternate_screen.take_changed();
        flush || primary || alternate
    }

    /// Visual column of the cursor on its row
    pub fn visual_cursor_col(&self) -> u16 {
        let cursor = self.active_cursor();
        let width = self.cols as usize;
        match self.active_screen().rows.get(cursor.row as usize) {
            Some(row) => columns::buffer_col_to_visual_col(row, cursor.col as usize, width) as u16,
            None => cursor.col,
        }
    }

    /// Resize the terminal
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.primary_screen.resize(cols, rows);
        self.alternate_screen.resize(cols, rows);
        self.scroll_region = (0, rows.saturating_sub(1));

        let max_col = cols.saturating_sub(1);
        let max_row = rows.saturating_sub(1);
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.col = cursor.col.min(max_col);
            cursor.row = cursor.row.min(max_row);
            if let Some(saved) = cursor.saved.as_mut() {
                saved.col = saved.col.min(max_col);
                saved.row = saved.row.min(max_row);
            }
        }
    }

    /// Full reset (RIS), keeping the size
    pub fn reset(&mut self) {
        *self = Self::with_scrollback(self.cols, self.rows, self.scrollback_limit);
    }

    /// Print a run of printable characters
    pub fn put_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.put_char(ch);
        }
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let Some(width) = ch.width() else {
            trace!("dropping control character {:?}", ch);
            return;
        };
        if width == 0 || columns::extends_previous(self.previous_scalar(), ch) {
            self.put_attached(ch);
            return;
        }

        let width = width.min(2) as u16;
        if width > self.cols {
            return;
        }

        // Wrap when the glyph does not fit before the right margin
        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };
        if cursor_col + width > self.cols {
            if self.modes.contains(TerminalMode::AutoWrap) {
                self.active_screen_mut().rows[cursor_row as usize].wrapped = true;
                self.active_cursor_mut().col = 0;
                self.index();
            } else {
                self.active_cursor_mut().col = self.cols - width;
            }
        }

        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if self.modes.contains(TerminalMode::InsertMode) {
            self.insert_chars(width);
        }
        self.clear_overwritten(row, col, width as usize);

        let style = self.style.clone();
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row].cells;
        cells[col] = Cell::new(ch, style.clone());
        if width == 2 {
            cells[col + 1] = Cell::new(DWC, style);
        }
        screen.mark_dirty(row);

        self.active_cursor_mut().col += width;
    }

    /// Scalar a zero-width character would attach to, skipping a `DWC`
    fn previous_scalar(&self) -> Option<char> {
        let cursor = self.active_cursor();
        let row = self.active_screen().rows.get(cursor.row as usize)?;
        let col = (cursor.col as usize).min(row.cells.len());
        let previous = row.slot(col.checked_sub(1)?)?;
        if previous == DWC {
            row.slot(col.checked_sub(2)?)
        } else {
            Some(previous)
        }
    }

    /// Place a structural scalar after the glyph it modifies.
    ///
    /// After a wide glyph it goes before the `DWC`, which moves right.
    fn put_attached(&mut self, ch: char) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let cols = self.cols as usize;
        let current = self.style.clone();
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row].cells;

        if col >= cols {
            if self.modes.contains(TerminalMode::AutoWrap) && self.wrap_last_cluster() {
                self.put_attached(ch);
            } else {
                trace!("no slot left for {:?} at the right margin", ch);
            }
            return;
        }
        if col > 0 && cells[col - 1].ch == DWC {
            let marker = cells[col - 1].clone();
            cells[col - 1] = Cell::new(ch, marker.style.clone());
            cells[col] = marker;
        } else {
            let style = match col.checked_sub(1) {
                Some(prev) => cells[prev].style.clone(),
                None => current,
            };
            cells[col] = Cell::new(ch, style);
        }
        screen.mark_dirty(row);
        self.active_cursor_mut().col += 1;
    }

    /// Move the cluster ending the cursor row to the start of the next line.
    ///
    /// Returns false when the cluster fills the whole row.
    fn wrap_last_cluster(&mut self) -> bool {
        let row = self.active_cursor().row as usize;
        let cols = self.cols as usize;
        let blank = Cell::blank(&self.style);
        let moved: Vec<Cell> = {
            let cells = &mut self.active_screen_mut().rows[row].cells;
            let end = cols.min(cells.len());
            let mut start = end.saturating_sub(1);
            while start > 0 && (cells[start].ch == DWC || is_attached(cells, start)) {
                start -= 1;
            }
            if start == 0 {
                return false;
            }
            cells[start..end]
                .iter_mut()
                .map(|cell| std::mem::replace(cell, blank.clone()))
                .collect()
        };

        let screen = self.active_screen_mut();
        screen.rows[row].wrapped = true;
        screen.mark_dirty(row);
        self.active_cursor_mut().col = 0;
        self.index();

        let row = self.active_cursor().row as usize;
        self.clear_overwritten(row, 0, moved.len());
        let width = moved.len();
        let screen = self.active_screen_mut();
        for (slot, cell) in screen.rows[row].cells.iter_mut().zip(moved) {
            *slot = cell;
        }
        screen.mark_dirty(row);
        self.active_cursor_mut().col = width as u16;
        true
    }

    /// Blank the remains of glyphs partly covered by a write at `col`
    fn clear_overwritten(&mut self, row: usize, col: usize, width: usize) {
        let blank = Cell::blank(&self.style);
        let cells = &mut self.active_screen_mut().rows[row].cells;
        let len = cells.len();
        if col >= len {
            return;
        }

        // Landing inside a wide glyph orphans its leading slot
        if cells[col].ch == DWC {
            let mut lead = col;
            while lead > 0 {
                lead -= 1;
                if !is_attached(cells, lead) {
                    break;
                }
            }
            cells[lead..col].fill(blank.clone());
        }

        // Overwriting a lead leaves its attached slots behind
        let start = (col + width).min(len);
        let mut end = start;
        while end < len && is_attached(cells, end) {
            end += 1;
        }
        cells[start..end].fill(blank);
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        let row = self.active_cursor().row as usize;
        self.active_cursor_mut().col = 0;
        self.active_screen_mut().mark_dirty(row);
    }

    /// Line feed; also returns the carriage under `AutoNewLine`
    pub fn linefeed(&mut self) {
        if self.modes.contains(TerminalMode::AutoNewLine) {
            self.active_cursor_mut().col = 0;
        }
        self.index();
    }

    /// Index - cursor down, scroll at the bottom of the region
    pub fn index(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row < self.rows.saturating_sub(1) {
            self.active_cursor_mut().row += 1;
        }
    }

    /// Reverse index - cursor up, scroll at the top of the region
    pub fn reverse_index(&mut self) {
        if self.active_cursor().row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    pub fn backspace(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        // A pending wrap sits past the last column
        cursor.col = cursor.col.min(cols.saturating_sub(1)).saturating_sub(1);
    }

    /// Move to the next tab stop (every 8 columns)
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = (((cursor.col / 8) + 1) * 8).min(cols.saturating_sub(1));
    }

    /// Scroll the region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        let cols = self.cols;
        let keep_history = !self.using_alternate && top == 0;

        let screen = self.active_screen_mut();
        if bottom >= screen.rows.len() || top > bottom {
            return;
        }
        for _ in 0..n.min((bottom - top + 1) as u16) {
            let removed = screen.rows.remove(top);
            if keep_history {
                screen.push_to_scrollback(removed);
            }
            screen.rows.insert(bottom, Row::new(cols));
        }
        screen.mark_all_dirty();
    }

    /// Scroll the region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        let cols = self.cols;

        let screen = self.active_screen_mut();
        if bottom >= screen.rows.len() || top > bottom {
            return;
        }
        for _ in 0..n.min((bottom - top + 1) as u16) {
            screen.rows.remove(bottom);
            screen.rows.insert(top, Row::new(cols));
        }
        screen.mark_all_dirty();
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_add(n).min(rows.saturating_sub(1));
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_add(n).min(cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.min(cols.saturating_sub(1)).saturating_sub(n);
    }

    /// Set cursor column (1-indexed)
    pub fn cursor_column(&mut self, col: u16) {
        let cols = self.cols;
        self.active_cursor_mut().col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    /// Set cursor row (1-indexed), relative to the region under `OriginMode`
    pub fn cursor_row(&mut self, row: u16) {
        let (top, bottom) = self.addressable_rows();
        self.active_cursor_mut().row = top.saturating_add(row.saturating_sub(1)).min(bottom);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor_row(row);
        self.cursor_column(col);
    }

    fn addressable_rows(&self) -> (u16, u16) {
        if self.modes.contains(TerminalMode::OriginMode) {
            self.scroll_region
        } else {
            (0, self.rows.saturating_sub(1))
        }
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let blank = Cell::blank(&self.style);
        let range = match mode {
            0 => {
                self.erase_in_line(0);
                cursor_row + 1..self.rows as usize
            }
            1 => {
                self.erase_in_line(1);
                0..cursor_row
            }
            2 | 3 => 0..self.rows as usize,
            _ => return,
        };
        let screen = self.active_screen_mut();
        for r in range {
            if let Some(row) = screen.rows.get_mut(r) {
                row.clear(&blank);
                screen.dirty_lines.insert(r);
                screen.changed = true;
            }
        }
        if mode == 3 {
            screen.scrollback.clear();
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let blank = Cell::blank(&self.style);
        let screen = self.active_screen_mut();
        let Some(line) = screen.rows.get_mut(row) else {
            return;
        };
        let len = line.cells.len();
        let range = match mode {
            0 => col.min(len)..len,
            1 => 0..(col + 1).min(len),
            2 => 0..len,
            _ => return,
        };
        line.cells[range].fill(blank);
        if mode != 1 {
            line.wrapped = false;
        }
        screen.mark_dirty(row);
    }

    /// Insert blank lines at the cursor, within the scroll region
    pub fn insert_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let screen = self.active_screen_mut();
        for _ in 0..(n as usize).min(bottom - cursor_row + 1) {
            screen.rows.remove(bottom);
            screen.rows.insert(cursor_row, Row::new(cols));
        }
        screen.mark_all_dirty();
    }

    /// Delete lines at the cursor, within the scroll region
    pub fn delete_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let screen = self.active_screen_mut();
        for _ in 0..(n as usize).min(bottom - cursor_row + 1) {
            screen.rows.remove(cursor_row);
            screen.rows.insert(bottom, Row::new(cols));
        }
        screen.mark_all_dirty();
    }

    /// Insert blank cells at the cursor, shifting the rest right (ICH)
    pub fn insert_chars(&mut self, n: u16) {
        self.edit_cursor_line(|cells, col, blank| {
            let n = (n as usize).min(cells.len() - col);
            cells[col..].rotate_right(n);
            cells[col..col + n].fill(blank);
        });
    }

    /// Delete cells at the cursor, shifting the rest left (DCH)
    pub fn delete_chars(&mut self, n: u16) {
        self.edit_cursor_line(|cells, col, blank| {
            let n = (n as usize).min(cells.len() - col);
            cells[col..].rotate_left(n);
            let len = cells.len();
            cells[len - n..].fill(blank);
        });
    }

    /// Blank cells from the cursor without shifting (ECH)
    pub fn erase_chars(&mut self, n: u16) {
        self.edit_cursor_line(|cells, col, blank| {
            let end = col.saturating_add(n as usize).min(cells.len());
            cells[col..end].fill(blank);
        });
    }

    fn edit_cursor_line<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut [Cell], usize, Cell),
    {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let blank = Cell::blank(&self.style);
        let screen = self.active_screen_mut();
        let Some(line) = screen.rows.get_mut(row) else {
            return;
        };
        if col >= line.cells.len() {
            return;
        }
        edit(line.cells.as_mut_slice(), col, blank);
        screen.mark_dirty(row);
    }

    /// Set scroll region (DECSTBM, 1-indexed) and home the cursor
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let last = self.rows.saturating_sub(1);
        let top = top.saturating_sub(1).min(last);
        let bottom = bottom.saturating_sub(1).min(last);
        if top < bottom {
            self.scroll_region = (top, bottom);
            self.cursor_position(1, 1);
        }
    }
}

fn is_attached(cells: &[Cell], index: usize) -> bool {
    let previous = index.checked_sub(1).map(|p| cells[p].ch);
    columns::extends_previous(previous, cells[index].ch)
}

impl ModeHandle for TerminalState {
    fn modes_mut(&mut self) -> &mut ModeSet {
        &mut self.modes
    }

    fn use_alternate_buffer(&mut self, enabled: bool) {
        if enabled == self.using_alternate {
            return;
        }
        if enabled {
            self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
            self.alternate_cursor = CursorState {
                saved: self.alternate_cursor.saved.take(),
                ..CursorState::default()
            };
        }
        self.using_alternate = enabled;
        self.active_screen_mut().mark_all_dirty();
    }

    /// DECSC: position and style of the active cursor
    fn save_cursor(&mut self) {
        let (col, row) = {
            let cursor = self.active_cursor();
            (cursor.col, cursor.row)
        };
        let style = self.style.clone();
        self.active_cursor_mut().saved = Some(SavedCursor { col, row, style });
    }

    fn restore_cursor(&mut self) {
        let (max_col, max_row) = (self.cols.saturating_sub(1), self.rows.saturating_sub(1));
        if let Some(saved) = self.active_cursor().saved.clone() {
            let cursor = self.active_cursor_mut();
            cursor.col = saved.col.min(max_col);
            cursor.row = saved.row.min(max_row);
            self.style = saved.style;
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.active_cursor_mut().visible = visible;
    }

    fn set_render_suspended(&mut self, suspended: bool) {
        self.render_suspended = suspended;
    }

    fn request_flush(&mut self) {
        self.flush_requested = true;
        self.active_screen_mut().mark_all_dirty();
    }

    fn clear_screen(&mut self) {
        self.erase_in_display(2);
        self.cursor_position(1, 1);
    }

    fn reset_scroll_region(&mut self) {
        self.scroll_region = (0, self.rows.saturating_sub(1));
    }
}

/// Screen buffer with scrollback
pub struct ScreenBuffer {
    /// Visible rows
    pub rows: Vec<Row>,
    /// Scrollback history, oldest first
    pub scrollback: VecDeque<Row>,
    pub scrollback_limit: usize,
    pub dirty_lines: HashSet<usize>,
    pub full_redraw: bool,
    /// Modified since the last render request
    changed: bool,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            dirty_lines: HashSet::new(),
            full_redraw: true,
            changed: true,
        }
    }

    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        self.rows.resize_with(new_rows as usize, || Row::new(new_cols));
        for row in self.rows.iter_mut().chain(self.scrollback.iter_mut()) {
            row.resize(new_cols);
        }
        self.mark_all_dirty();
    }

    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        if self.scrollback.len() == self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.scrollback.push_back(row);
    }

    /// Scrollback plus visible lines
    pub fn total_lines(&self) -> usize {
        self.scrollback.len() + self.rows.len()
    }

    pub fn mark_dirty(&mut self, line: usize) {
        self.dirty_lines.insert(line);
        self.changed = true;
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_redraw = true;
        self.changed = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_lines.clear();
        self.full_redraw = false;
    }

    fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// A single row
#[derive(Clone, Debug)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, blank: &Cell) {
        self.cells.fill(blank.clone());
        self.wrapped = false;
    }

    /// Row text without structural slots or trailing blanks
    pub fn text(&self) -> String {
        let text: String = self.cells.iter().map(|c| c.ch).filter(|&c| c != DWC).collect();
        text.trim_end().to_string()
    }
}

impl LineCells for Row {
    fn slot(&self, index: usize) -> Option<char> {
        self.cells.get(index).map(|cell| cell.ch)
    }
}

/// A single cell slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub style: TextStyle,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            style: TextStyle::EMPTY,
        }
    }
}

impl Cell {
    pub fn new(ch: char, style: TextStyle) -> Self {
        Self { ch, style }
    }

    /// Erased cell: keeps the colors of `style`, drops its attributes
    pub fn blank(style: &TextStyle) -> Self {
        Self {
            ch: ' ',
            style: style.create_empty_with_colors(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.ch == DWC
    }
}

/// Cursor shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    #[default]
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
}

impl CursorShape {
    /// Create from DECSCUSR parameter
    pub fn from_decscusr(n: u16) -> Self {
        match n {
            1 => CursorShape::BlinkingBlock,
            2 => CursorShape::SteadyBlock,
            3 => CursorShape::BlinkingUnderline,
            4 => CursorShape::SteadyUnderline,
            5 => CursorShape::BlinkingBar,
            6 => CursorShape::SteadyBar,
            _ => CursorShape::Default,
        }
    }
}

/// Cursor state
#[derive(Clone, Debug)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub shape: CursorShape,
    pub saved: Option<SavedCursor>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            shape: CursorShape::Default,
            saved: None,
        }
    }
}

/// Saved cursor state
#[derive(Clone, Debug)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub style: TextStyle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::style::StyleOptions;
    use crate::core::term::TerminalColor;
    use pretty_assertions::assert_eq;

    fn slots(state: &TerminalState, row: usize) -> Vec<char> {
        state.active_screen().rows[row].cells.iter().map(|c| c.ch).collect()
    }

    #[test]
    fn test_wide_char_gets_marker() {
        let mut state = TerminalState::new(6, 2);
        state.put_str("中A");
        assert_eq!(slots(&state, 0), vec!['中', DWC, 'A', ' ', ' ', ' ']);
        assert_eq!(state.active_cursor().col, 3);
        assert_eq!(state.visual_cursor_col(), 3);
    }

    #[test]
    fn test_combining_mark_takes_slot() {
        let mut state = TerminalState::new(6, 2);
        state.put_str("e\u{301}x");
        assert_eq!(slots(&state, 0), vec!['e', '\u{301}', 'x', ' ', ' ', ' ']);
        assert_eq!(state.visual_cursor_col(), 2);
    }

    #[test]
    fn test_modifier_goes_before_marker() {
        let mut state = TerminalState::new(8, 2);
        state.put_str("\u{1F44D}\u{1F3FD}!");
        assert_eq!(
            slots(&state, 0),
            vec!['\u{1F44D}', '\u{1F3FD}', DWC, '!', ' ', ' ', ' ', ' ']
        );
        assert_eq!(state.visual_cursor_col(), 3);
    }

    #[test]
    fn test_zwj_gender_sequence() {
        let mut state = TerminalState::new(8, 2);
        state.put_str("\u{1F3C3}\u{200D}\u{2640}\u{FE0F}");
        assert_eq!(
            slots(&state, 0)[..5],
            ['\u{1F3C3}', '\u{200D}', '\u{2640}', '\u{FE0F}', DWC]
        );
        assert_eq!(state.visual_cursor_col(), 2);
    }

    #[test]
    fn test_wide_char_wraps_at_margin() {
        let mut state = TerminalState::new(3, 2);
        state.put_str("ab中");
        assert_eq!(slots(&state, 0), vec!['a', 'b', ' ']);
        assert_eq!(slots(&state, 1), vec!['中', DWC, ' ']);
        assert!(state.active_screen().rows[0].wrapped);
    }

    #[test]
    fn test_combining_mark_at_margin_wraps_with_base() {
        let mut state = TerminalState::new(3, 2);
        state.put_str("abe\u{301}");
        assert_eq!(slots(&state, 0), vec!['a', 'b', ' ']);
        assert_eq!(slots(&state, 1), vec!['e', '\u{301}', ' ']);
        assert!(state.active_screen().rows[0].wrapped);
        assert_eq!(state.visual_cursor_col(), 1);
    }

    #[test]
    fn test_modifier_at_margin_wraps_with_wide_base() {
        let mut state = TerminalState::new(4, 2);
        state.put_str("ab\u{1F44B}\u{1F3FD}");
        assert_eq!(slots(&state, 0), vec!['a', 'b', ' ', ' ']);
        assert_eq!(slots(&state, 1), vec!['\u{1F44B}', '\u{1F3FD}', DWC, ' ']);
    }

    #[test]
    fn test_saved_cursor_clamped_after_shrink() {
        let mut state = TerminalState::new(80, 24);
        state.cursor_position(24, 70);
        state.save_cursor();
        state.resize(10, 5);
        state.restore_cursor();
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (9, 4));
        state.put_char('x');
        assert_eq!(state.active_screen().rows[4].text(), "         x");
    }

    #[test]
    fn test_no_wrap_without_autowrap() {
        let mut state = TerminalState::new(3, 2);
        TerminalMode::AutoWrap.set_enabled(&mut state, false);
        state.put_str("abcd");
        assert_eq!(slots(&state, 0), vec!['a', 'b', 'd']);
        assert_eq!(state.active_cursor().row, 0);
    }

    #[test]
    fn test_overwrite_half_of_wide_char() {
        let mut state = TerminalState::new(4, 1);
        state.put_str("中");
        state.cursor_position(1, 2);
        state.put_char('x');
        assert_eq!(slots(&state, 0), vec![' ', 'x', ' ', ' ']);

        state.cursor_position(1, 1);
        state.put_str("文");
        state.cursor_position(1, 1);
        state.put_char('y');
        assert_eq!(slots(&state, 0), vec!['y', ' ', ' ', ' ']);
    }

    #[test]
    fn test_insert_mode_shifts() {
        let mut state = TerminalState::new(5, 1);
        state.put_str("abc");
        state.cursor_position(1, 1);
        TerminalMode::InsertMode.set_enabled(&mut state, true);
        state.put_char('X');
        assert_eq!(slots(&state, 0), vec!['X', 'a', 'b', 'c', ' ']);
    }

    #[test]
    fn test_auto_newline() {
        let mut state = TerminalState::new(5, 3);
        state.put_str("ab");
        state.linefeed();
        assert_eq!(state.active_cursor().col, 2);
        TerminalMode::AutoNewLine.set_enabled(&mut state, true);
        state.linefeed();
        assert_eq!(state.active_cursor().col, 0);
        assert_eq!(state.active_cursor().row, 2);
    }

    #[test]
    fn test_origin_mode_addressing() {
        let mut state = TerminalState::new(5, 10);
        state.set_scroll_region(3, 6);
        TerminalMode::OriginMode.set_enabled(&mut state, true);
        state.cursor_position(1, 1);
        assert_eq!(state.active_cursor().row, 2);
        state.cursor_position(20, 1);
        assert_eq!(state.active_cursor().row, 5);
    }

    #[test]
    fn test_scrollback_limit() {
        let mut state = TerminalState::with_scrollback(4, 2, 3);
        for ch in ['a', 'b', 'c', 'd', 'e', 'f'] {
            state.put_char(ch);
            state.carriage_return();
            state.linefeed();
        }
        let screen = state.active_screen();
        assert_eq!(screen.scrollback.len(), 3);
        assert_eq!(screen.scrollback[0].text(), "c");
        assert_eq!(screen.total_lines(), 5);
    }

    #[test]
    fn test_alternate_buffer_round_trip() {
        let mut state = TerminalState::new(4, 2);
        state.put_str("hi");
        TerminalMode::StoreCursor.set_enabled(&mut state, true);
        TerminalMode::AlternateBuffer.set_enabled(&mut state, true);
        assert!(state.using_alternate);
        state.put_str("xyz");
        TerminalMode::AlternateBuffer.set_enabled(&mut state, false);
        TerminalMode::StoreCursor.set_enabled(&mut state, false);
        assert!(!state.using_alternate);
        assert_eq!(state.active_screen().rows[0].text(), "hi");
        assert_eq!(state.active_cursor().col, 2);
    }

    #[test]
    fn test_synchronized_update_holds_render() {
        let mut state = TerminalState::new(4, 2);
        assert!(state.take_render_request());
        TerminalMode::SynchronizedUpdate.set_enabled(&mut state, true);
        state.put_str("ab");
        assert!(!state.take_render_request());
        TerminalMode::SynchronizedUpdate.set_enabled(&mut state, false);
        assert!(state.take_render_request());
        assert!(!state.take_render_request());
    }

    #[test]
    fn test_wide_column_clears_screen() {
        let mut state = TerminalState::new(4, 4);
        state.put_str("abc");
        state.set_scroll_region(2, 3);
        TerminalMode::WideColumn.set_enabled(&mut state, true);
        assert_eq!(state.active_screen().rows[0].text(), "");
        assert_eq!(state.scroll_region, (0, 3));
        assert_eq!(state.cols, 4);
    }

    #[test]
    fn test_erase_keeps_background_drops_attributes() {
        let mut state = TerminalState::new(4, 1);
        state.style = TextStyle::new(
            None,
            Some(TerminalColor::index(4)),
            StyleOptions::BOLD,
        );
        state.put_str("abcd");
        state.cursor_position(1, 2);
        state.erase_in_line(0);
        let cells = &state.active_screen().rows[0].cells;
        assert_eq!(cells[0].ch, 'a');
        assert!(cells[0].style.has_option(StyleOptions::BOLD));
        assert_eq!(cells[1].ch, ' ');
        assert_eq!(cells[1].style.background(), Some(&TerminalColor::index(4)));
        assert!(!cells[1].style.has_option(StyleOptions::BOLD));
    }

    #[test]
    fn test_char_editing() {
        let mut state = TerminalState::new(5, 1);
        state.put_str("abcde");
        state.cursor_position(1, 2);
        state.delete_chars(2);
        assert_eq!(slots(&state, 0), vec!['a', 'd', 'e', ' ', ' ']);
        state.insert_chars(1);
        assert_eq!(slots(&state, 0), vec!['a', ' ', 'd', 'e', ' ']);
        state.erase_chars(10);
        assert_eq!(slots(&state, 0), vec!['a', ' ', ' ', ' ', ' ']);
    }
}

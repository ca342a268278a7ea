//! VT sequence parser
//!
//! Char-fed ANSI/VT state machine. [`VtParser::run`] is the interpreter loop
//! over a [`DataStream`]: printable runs are written in bulk, everything else
//! goes through [`VtParser::feed`].

use parking_lot::Mutex;
use tracing::debug;

use super::color::TerminalColor;
use super::mode::{ModeHandle, TerminalMode};
use super::state::{CursorShape, TerminalState};
use super::style::{StyleOptions, TextStyle};
use crate::core::stream::{DataStream, StreamError};

/// Longest printable run written under one lock
const MAX_PRINT_RUN: usize = 4096;
const MAX_OSC_LEN: usize = 4096;
const MAX_PARAMS: usize = 32;

/// Response that needs to be sent back to the PTY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Status report: terminal OK
    OperatingStatus,
    DeviceAttributes,
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::OperatingStatus => b"\x1b[0n".to_vec(),
            // VT220
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<char>,
    current_param: Option<u16>,
    osc_string: String,
    /// DCS/SOS/PM/APC payloads are collected like OSC and dropped
    string_is_osc: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    /// ESC received within a string, waiting for backslash
    EscapeInOsc,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_printable(ch: char) -> bool {
    !((ch as u32) < 0x20 || ch == '\u{7f}')
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_string: String::new(),
            string_is_osc: true,
        }
    }

    /// Interpret `stream` until it ends, sending replies through `respond`.
    pub fn run<F>(&mut self, stream: &mut DataStream, state: &Mutex<TerminalState>, mut respond: F)
    where
        F: FnMut(Response),
    {
        loop {
            let ch = match stream.next_char() {
                Ok(ch) => ch,
                Err(StreamError::Eof) => break,
            };

            if self.state == ParserState::Ground && is_printable(ch) {
                stream.push_char(ch);
                match stream.read_non_control_characters(MAX_PRINT_RUN) {
                    Ok(run) => state.lock().put_str(&run),
                    Err(StreamError::Eof) => break,
                }
                continue;
            }

            let response = self.feed(ch, &mut state.lock());
            if let Some(response) = response {
                respond(response);
            }
        }
        debug!("interpreter reached end of stream");
    }

    /// Feed a whole string, collecting replies
    pub fn feed_str(&mut self, text: &str, state: &mut TerminalState) -> Vec<Response> {
        text.chars().filter_map(|ch| self.feed(ch, state)).collect()
    }

    /// Feed a single character to the parser
    pub fn feed(&mut self, ch: char, state: &mut TerminalState) -> Option<Response> {
        // C0 controls act immediately, even inside a sequence
        if (ch as u32) < 0x20
            && self.state != ParserState::OscString
            && self.state != ParserState::EscapeInOsc
        {
            match ch {
                '\x1b' => self.enter_escape(),
                '\x08' => state.backspace(),
                '\t' => state.horizontal_tab(),
                '\n' | '\x0b' | '\x0c' => state.linefeed(),
                '\r' => state.carriage_return(),
                // CAN / SUB abort the sequence
                '\x18' | '\x1a' => self.state = ParserState::Ground,
                _ => {}
            }
            return None;
        }

        match self.state {
            ParserState::Ground => {
                if ch != '\u{7f}' {
                    state.put_char(ch);
                }
                None
            }
            ParserState::Escape => self.escape(ch, state),
            ParserState::EscapeIntermediate => {
                match ch {
                    '\x20'..='\x2f' => self.intermediates.push(ch),
                    // Charset designations and the like
                    _ => self.state = ParserState::Ground,
                }
                None
            }
            ParserState::CsiEntry => self.csi_entry(ch, state),
            ParserState::CsiParam => self.csi_param(ch, state),
            ParserState::CsiIntermediate => match ch {
                '\x20'..='\x2f' => {
                    self.intermediates.push(ch);
                    None
                }
                '\x40'..='\x7e' => self.execute_csi(ch, state),
                _ => {
                    self.state = ParserState::Ground;
                    None
                }
            },
            ParserState::OscString => {
                self.osc_string_state(ch, state);
                None
            }
            ParserState::EscapeInOsc => self.escape_in_osc(ch, state),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn enter_string(&mut self, is_osc: bool) {
        self.state = ParserState::OscString;
        self.osc_string.clear();
        self.string_is_osc = is_osc;
    }

    fn escape(&mut self, ch: char, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;
        match ch {
            '[' => self.state = ParserState::CsiEntry,
            ']' => self.enter_string(true),
            'P' | 'X' | '^' | '_' => self.enter_string(false),
            // DECSC / DECRC
            '7' => state.save_cursor(),
            '8' => state.restore_cursor(),
            'D' => state.index(),
            'E' => {
                state.carriage_return();
                state.index();
            }
            'M' => state.reverse_index(),
            'c' => state.reset(),
            // DECKPAM / DECKPNM
            '=' => TerminalMode::Keypad.set_enabled(state, true),
            '>' => TerminalMode::Keypad.set_enabled(state, false),
            '\x20'..='\x2f' => {
                self.intermediates.push(ch);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => debug!("Unknown ESC sequence: {:?}", ch),
        }
        None
    }

    /// ESC inside a string: ST, or the start of a new sequence
    fn escape_in_osc(&mut self, ch: char, state: &mut TerminalState) -> Option<Response> {
        self.execute_osc(state);
        if ch == '\\' {
            self.state = ParserState::Ground;
            None
        } else {
            self.enter_escape();
            self.escape(ch, state)
        }
    }

    fn osc_string_state(&mut self, ch: char, state: &mut TerminalState) {
        match ch {
            '\x07' | '\u{9c}' => {
                self.execute_osc(state);
                self.state = ParserState::Ground;
            }
            '\x1b' => self.state = ParserState::EscapeInOsc,
            ch if (ch as u32) < 0x20 => {}
            ch => {
                if self.osc_string.len() < MAX_OSC_LEN {
                    self.osc_string.push(ch);
                }
            }
        }
    }

    fn push_param(&mut self) {
        let param = self.current_param.take().unwrap_or(0);
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    fn csi_entry(&mut self, ch: char, state: &mut TerminalState) -> Option<Response> {
        match ch {
            '0'..='9' | ';' | ':' => {
                self.state = ParserState::CsiParam;
                return self.csi_param(ch, state);
            }
            '?' | '>' | '!' | '=' | '<' => self.intermediates.push(ch),
            '\x20'..='\x2f' => {
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '\x40'..='\x7e' => return self.execute_csi(ch, state),
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn csi_param(&mut self, ch: char, state: &mut TerminalState) -> Option<Response> {
        match ch {
            '0'..='9' => {
                let digit = ch as u16 - '0' as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameters are flattened into the parameter list
            ';' | ':' => self.push_param(),
            '\x20'..='\x2f' => {
                if self.current_param.is_some() {
                    self.push_param();
                }
                self.intermediates.push(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '\x40'..='\x7e' => {
                if self.current_param.is_some() {
                    self.push_param();
                }
                return self.execute_csi(ch, state);
            }
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn execute_csi(&mut self, final_char: char, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;
        let is_private = self.intermediates.contains(&'?');
        let is_gt = self.intermediates.contains(&'>');
        let params = &self.params;
        let count = params.first().copied().unwrap_or(1).max(1);

        match (is_private, is_gt, final_char) {
            (false, false, 'A') => state.cursor_up(count),
            (false, false, 'B') => state.cursor_down(count),
            (false, false, 'C') => state.cursor_forward(count),
            (false, false, 'D') => state.cursor_backward(count),
            // CNL / CPL
            (false, false, 'E') => {
                state.cursor_down(count);
                state.carriage_return();
            }
            (false, false, 'F') => {
                state.cursor_up(count);
                state.carriage_return();
            }
            // CHA / HPA
            (false, false, 'G') | (false, false, '`') => {
                state.cursor_column(params.first().copied().unwrap_or(1))
            }
            (false, false, 'H') | (false, false, 'f') => {
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
            }
            // VPA
            (false, false, 'd') => state.cursor_row(params.first().copied().unwrap_or(1)),

            (false, false, 'J') => state.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, false, 'K') => state.erase_in_line(params.first().copied().unwrap_or(0)),

            (false, false, 'L') => state.insert_lines(count),
            (false, false, 'M') => state.delete_lines(count),
            (false, false, '@') => state.insert_chars(count),
            (false, false, 'P') => state.delete_chars(count),
            (false, false, 'X') => state.erase_chars(count),

            (false, false, 'S') => state.scroll_up(count),
            (false, false, 'T') => state.scroll_down(count),

            // DECSTBM
            (false, false, 'r') => {
                let top = params.first().copied().filter(|&p| p > 0).unwrap_or(1);
                let bottom = params.get(1).copied().filter(|&p| p > 0).unwrap_or(state.rows);
                state.set_scroll_region(top, bottom);
            }

            (false, false, 'm') => execute_sgr(params, state),

            (false, false, 's') => state.save_cursor(),
            (false, false, 'u') => state.restore_cursor(),

            // DSR
            (false, false, 'n') => match params.first() {
                Some(5) => return Some(Response::OperatingStatus),
                Some(6) => {
                    let top = if state.modes.contains(TerminalMode::OriginMode) {
                        state.scroll_region.0
                    } else {
                        0
                    };
                    let row = state.active_cursor().row.saturating_sub(top);
                    return Some(Response::CursorPosition(row + 1, state.visual_cursor_col() + 1));
                }
                _ => {}
            },

            (false, false, 'c') => return Some(Response::DeviceAttributes),
            (false, true, 'c') => return Some(Response::SecondaryDeviceAttributes),

            (true, false, 'h') | (true, false, 'l') => {
                let enable = final_char == 'h';
                for &p in params {
                    set_dec_private_mode(p, enable, state);
                }
            }
            (false, false, 'h') | (false, false, 'l') => {
                let enable = final_char == 'h';
                for &p in params {
                    match TerminalMode::from_ansi(p) {
                        Some(mode) => mode.set_enabled(state, enable),
                        None => debug!("Unknown ANSI mode {}", p),
                    }
                }
            }

            (false, false, 'q') if self.intermediates.contains(&' ') => {
                // DECSCUSR
                let shape = params.first().copied().unwrap_or(0);
                state.active_cursor_mut().shape = CursorShape::from_decscusr(shape);
            }
            (false, false, 'q') if self.intermediates.contains(&'"') => {
                // DECSCA
                let protect = params.first().copied().unwrap_or(0) == 1;
                state.style = state
                    .style
                    .to_builder()
                    .set_option(StyleOptions::PROTECTED, protect)
                    .build();
            }

            _ => debug!(
                "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                self.intermediates, params, final_char
            ),
        }
        None
    }

    fn execute_osc(&mut self, state: &mut TerminalState) {
        if !self.string_is_osc {
            return;
        }
        let Some((code, text)) = self.osc_string.split_once(';') else {
            return;
        };
        match code {
            "0" | "1" | "2" => state.title = text.to_string(),
            _ => debug!("Unhandled OSC {}", code),
        }
    }
}

/// DEC private mode, expanding the 1049 composite
fn set_dec_private_mode(code: u16, enable: bool, state: &mut TerminalState) {
    if code == 1049 {
        let modes = [TerminalMode::StoreCursor, TerminalMode::AlternateBuffer];
        if enable {
            modes.iter().for_each(|m| m.set_enabled(state, true));
        } else {
            modes.iter().rev().for_each(|m| m.set_enabled(state, false));
        }
        return;
    }
    match TerminalMode::from_dec_private(code) {
        Some(mode) => mode.set_enabled(state, enable),
        None => debug!("Unknown DEC private mode {}", code),
    }
}

fn execute_sgr(params: &[u16], state: &mut TerminalState) {
    if params.is_empty() {
        state.style = TextStyle::EMPTY;
        return;
    }

    let mut style = state.style.to_builder();
    let mut iter = params.iter().copied();

    while let Some(param) = iter.next() {
        style = match param {
            0 => TextStyle::EMPTY.to_builder(),
            1 => style.set_option(StyleOptions::BOLD, true),
            2 => style.set_option(StyleOptions::DIM, true),
            3 => style.set_option(StyleOptions::ITALIC, true),
            4 => style.set_option(StyleOptions::UNDERLINE, true),
            5 => style.set_option(StyleOptions::SLOW_BLINK, true),
            6 => style.set_option(StyleOptions::RAPID_BLINK, true),
            7 => style.set_option(StyleOptions::INVERSE, true),
            8 => style.set_option(StyleOptions::HIDDEN, true),

            22 => style.set_option(StyleOptions::BOLD | StyleOptions::DIM, false),
            23 => style.set_option(StyleOptions::ITALIC, false),
            24 => style.set_option(StyleOptions::UNDERLINE, false),
            25 => style.set_option(StyleOptions::SLOW_BLINK | StyleOptions::RAPID_BLINK, false),
            27 => style.set_option(StyleOptions::INVERSE, false),
            28 => style.set_option(StyleOptions::HIDDEN, false),

            30..=37 => style.set_foreground(Some(TerminalColor::index(i32::from(param - 30)))),
            38 => match extended_color(&mut iter) {
                Some(color) => style.set_foreground(Some(color)),
                None => style,
            },
            39 => style.set_foreground(None),

            40..=47 => style.set_background(Some(TerminalColor::index(i32::from(param - 40)))),
            48 => match extended_color(&mut iter) {
                Some(color) => style.set_background(Some(color)),
                None => style,
            },
            49 => style.set_background(None),

            90..=97 => style.set_foreground(Some(TerminalColor::index(i32::from(param - 90 + 8)))),
            100..=107 => {
                style.set_background(Some(TerminalColor::index(i32::from(param - 100 + 8))))
            }

            _ => {
                debug!("Unhandled SGR {}", param);
                style
            }
        };
    }
    state.style = style.build();
}

/// `5;n` (palette) or `2;r;g;b` (truecolor) after SGR 38/48
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<TerminalColor> {
    match iter.next()? {
        5 => iter.next().map(|n| TerminalColor::index(i32::from(n))),
        2 => {
            let mut channel = || iter.next().unwrap_or(0).min(255) as u8;
            let (r, g, b) = (channel(), channel(), channel());
            Some(TerminalColor::rgb(r, g, b))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::{data_stream, PerformanceMode, StreamOptions};
    use crate::core::term::DWC;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> (TerminalState, Vec<Response>) {
        let mut state = TerminalState::new(80, 24);
        let responses = VtParser::new().feed_str(text, &mut state);
        (state, responses)
    }

    #[test]
    fn test_cursor_movement() {
        let (state, _) = parse("\x1b[5;10H");
        assert_eq!(state.active_cursor().row, 4);
        assert_eq!(state.active_cursor().col, 9);
    }

    #[test]
    fn test_sgr_colors() {
        let (state, _) = parse("\x1b[31;48;5;200m");
        assert_eq!(state.style.foreground(), Some(&TerminalColor::index(1)));
        assert_eq!(state.style.background(), Some(&TerminalColor::index(200)));

        let (state, _) = parse("\x1b[38;2;10;20;30;1m");
        assert_eq!(state.style.foreground(), Some(&TerminalColor::rgb(10, 20, 30)));
        assert!(state.style.has_option(StyleOptions::BOLD));
    }

    #[test]
    fn test_sgr_attributes_and_reset() {
        let (state, _) = parse("\x1b[1;3;5;7mX\x1b[22;25m");
        assert!(state.style.has_option(StyleOptions::ITALIC | StyleOptions::INVERSE));
        assert!(!state.style.has_option(StyleOptions::BOLD));
        assert!(!state.style.has_option(StyleOptions::SLOW_BLINK));

        let cell = &state.active_screen().rows[0].cells[0];
        assert_eq!(cell.ch, 'X');
        assert!(cell.style.has_option(StyleOptions::BOLD | StyleOptions::SLOW_BLINK));

        let (state, _) = parse("\x1b[1;31m\x1b[m");
        assert_eq!(state.style, TextStyle::EMPTY);
    }

    #[test]
    fn test_protected_attribute() {
        let (state, _) = parse("\x1b[1\"qA\x1b[0\"qB");
        let cells = &state.active_screen().rows[0].cells;
        assert!(cells[0].style.has_option(StyleOptions::PROTECTED));
        assert!(!cells[1].style.has_option(StyleOptions::PROTECTED));
    }

    #[test]
    fn test_alternate_screen_1049() {
        let (state, _) = parse("main\x1b[?1049halt\x1b[?1049l");
        assert!(!state.using_alternate);
        assert_eq!(state.active_screen().rows[0].text(), "main");
        assert_eq!(state.active_cursor().col, 4);
    }

    #[test]
    fn test_modes_are_recorded() {
        let (state, _) = parse("\x1b[?1h\x1b[?2004h\x1b=\x1b[20h\x1b[?9999h");
        assert!(state.modes.contains(TerminalMode::CursorKey));
        assert!(state.modes.contains(TerminalMode::BracketedPasteMode));
        assert!(state.modes.contains(TerminalMode::Keypad));
        assert!(state.modes.contains(TerminalMode::AutoNewLine));

        let (state, _) = parse("\x1b[?25l");
        assert!(!state.active_cursor().visible);
        assert!(!state.modes.contains(TerminalMode::CursorVisible));
    }

    #[test]
    fn test_synchronized_update() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();
        state.take_render_request();
        parser.feed_str("\x1b[?2026hchanges", &mut state);
        assert!(state.is_render_suspended());
        assert!(!state.take_render_request());
        parser.feed_str("\x1b[?2026l", &mut state);
        assert!(state.take_render_request());
    }

    #[test]
    fn test_cursor_report_uses_visual_column() {
        let (_, responses) = parse("中文x\x1b[6n");
        assert_eq!(responses, vec![Response::CursorPosition(1, 6)]);
        assert_eq!(Response::CursorPosition(1, 6).to_bytes(), b"\x1b[1;6R".to_vec());
    }

    #[test]
    fn test_device_attributes() {
        let (_, responses) = parse("\x1b[c\x1b[>c\x1b[5n");
        assert_eq!(
            responses,
            vec![
                Response::DeviceAttributes,
                Response::SecondaryDeviceAttributes,
                Response::OperatingStatus,
            ]
        );
    }

    #[test]
    fn test_osc_title() {
        let (state, _) = parse("\x1b]0;first\x07");
        assert_eq!(state.title, "first");
        let (state, _) = parse("\x1b]2;second\x1b\\");
        assert_eq!(state.title, "second");
        let (state, _) = parse("\x1b]2;third\x1b[1m");
        assert_eq!(state.title, "third");
        assert!(state.style.has_option(StyleOptions::BOLD));
        let (state, _) = parse("\x1bPignored;payload\x1b\\");
        assert_eq!(state.title, "");
    }

    #[test]
    fn test_scroll_region_and_cursor_shape() {
        let (state, _) = parse("\x1b[5;10r\x1b[4 q");
        assert_eq!(state.scroll_region, (4, 9));
        assert_eq!(state.active_cursor().row, 0);
        assert_eq!(state.active_cursor().shape, CursorShape::SteadyUnderline);
    }

    #[test]
    fn test_control_inside_csi() {
        let (state, _) = parse("abcd\x1b[\r1Cx");
        assert_eq!(state.active_screen().rows[0].text(), "axcd");
    }

    #[test]
    fn test_run_over_stream() {
        let (mut writer, mut stream) = data_stream(StreamOptions::new(PerformanceMode::Latency));
        writer.append("\x1b[1mhi\x1b[0m ");
        writer.append("\u{1F44D}");
        writer.append("\u{1F3FD}\x1b[6n");
        writer.close();

        let state = Mutex::new(TerminalState::new(10, 2));
        let mut responses = Vec::new();
        VtParser::new().run(&mut stream, &state, |r| responses.push(r));

        let state = state.lock();
        let cells: Vec<char> = state.active_screen().rows[0].cells.iter().map(|c| c.ch).take(6).collect();
        assert_eq!(cells, vec!['h', 'i', ' ', '\u{1F44D}', '\u{1F3FD}', DWC]);
        assert!(state.active_screen().rows[0].cells[0].style.has_option(StyleOptions::BOLD));
        assert_eq!(responses, vec![Response::CursorPosition(1, 6)]);
    }
}

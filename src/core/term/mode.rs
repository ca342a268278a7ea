//! Terminal mode registry
//!
//! Each session carries one flag per [`TerminalMode`] in a [`ModeSet`].
//! Toggling a mode records the flag and runs its side effect against a
//! [`ModeHandle`], usually the terminal state.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::trace;

/// Closed set of terminal modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalMode {
    Null,
    CursorKey,
    Ansi,
    WideColumn,
    SmoothScroll,
    ReverseVideo,
    OriginMode,
    AutoWrap,
    AutoRepeatKeys,
    Interlace,
    Keypad,
    StoreCursor,
    CursorBlinking,
    AllowWideColumn,
    ReverseWrapAround,
    AutoNewLine,
    KeyboardAction,
    InsertMode,
    SendReceive,
    EightBitInput,
    AltSendsEscape,
    CursorVisible,
    AlternateBuffer,
    BracketedPasteMode,
    SynchronizedUpdate,
}

/// Side effects a mode toggle may need from its session
pub trait ModeHandle {
    fn modes_mut(&mut self) -> &mut ModeSet;
    fn use_alternate_buffer(&mut self, enabled: bool);
    fn save_cursor(&mut self);
    fn restore_cursor(&mut self);
    fn set_cursor_visible(&mut self, visible: bool);
    fn set_render_suspended(&mut self, suspended: bool);
    /// Ask for one coalesced render of everything held back
    fn request_flush(&mut self);
    fn clear_screen(&mut self);
    fn reset_scroll_region(&mut self);
}

impl TerminalMode {
    pub const ALL: [TerminalMode; 25] = [
        TerminalMode::Null,
        TerminalMode::CursorKey,
        TerminalMode::Ansi,
        TerminalMode::WideColumn,
        TerminalMode::SmoothScroll,
        TerminalMode::ReverseVideo,
        TerminalMode::OriginMode,
        TerminalMode::AutoWrap,
        TerminalMode::AutoRepeatKeys,
        TerminalMode::Interlace,
        TerminalMode::Keypad,
        TerminalMode::StoreCursor,
        TerminalMode::CursorBlinking,
        TerminalMode::AllowWideColumn,
        TerminalMode::ReverseWrapAround,
        TerminalMode::AutoNewLine,
        TerminalMode::KeyboardAction,
        TerminalMode::InsertMode,
        TerminalMode::SendReceive,
        TerminalMode::EightBitInput,
        TerminalMode::AltSendsEscape,
        TerminalMode::CursorVisible,
        TerminalMode::AlternateBuffer,
        TerminalMode::BracketedPasteMode,
        TerminalMode::SynchronizedUpdate,
    ];

    fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Mode for a DEC private number (`CSI ? n h/l`).
    ///
    /// 1049 is a composite (save cursor + alternate screen) and is expanded by
    /// the interpreter.
    pub fn from_dec_private(code: u16) -> Option<Self> {
        let mode = match code {
            1 => TerminalMode::CursorKey,
            2 => TerminalMode::Ansi,
            3 => TerminalMode::WideColumn,
            4 => TerminalMode::SmoothScroll,
            5 => TerminalMode::ReverseVideo,
            6 => TerminalMode::OriginMode,
            7 => TerminalMode::AutoWrap,
            8 => TerminalMode::AutoRepeatKeys,
            9 => TerminalMode::Interlace,
            12 => TerminalMode::CursorBlinking,
            25 => TerminalMode::CursorVisible,
            40 => TerminalMode::AllowWideColumn,
            45 => TerminalMode::ReverseWrapAround,
            47 | 1047 => TerminalMode::AlternateBuffer,
            66 => TerminalMode::Keypad,
            1034 => TerminalMode::EightBitInput,
            1036 | 1039 => TerminalMode::AltSendsEscape,
            1048 => TerminalMode::StoreCursor,
            2004 => TerminalMode::BracketedPasteMode,
            2026 => TerminalMode::SynchronizedUpdate,
            _ => return None,
        };
        Some(mode)
    }

    /// Mode for an ANSI number (`CSI n h/l`)
    pub fn from_ansi(code: u16) -> Option<Self> {
        match code {
            2 => Some(TerminalMode::KeyboardAction),
            4 => Some(TerminalMode::InsertMode),
            12 => Some(TerminalMode::SendReceive),
            20 => Some(TerminalMode::AutoNewLine),
            _ => None,
        }
    }

    /// Record the flag and apply this mode's side effect.
    pub fn set_enabled<H: ModeHandle + ?Sized>(self, handle: &mut H, enabled: bool) {
        handle.modes_mut().set(self, enabled);
        trace!("mode {:?} -> {}", self, enabled);

        match self {
            TerminalMode::AlternateBuffer => handle.use_alternate_buffer(enabled),
            TerminalMode::StoreCursor => {
                if enabled {
                    handle.save_cursor();
                } else {
                    handle.restore_cursor();
                }
            }
            TerminalMode::CursorVisible => handle.set_cursor_visible(enabled),
            TerminalMode::SynchronizedUpdate => {
                handle.set_render_suspended(enabled);
                if !enabled {
                    handle.request_flush();
                }
            }
            TerminalMode::WideColumn => {
                handle.clear_screen();
                handle.reset_scroll_region();
            }
            // Flag-only modes, read by the key encoder and screen state
            TerminalMode::CursorKey
            | TerminalMode::Keypad
            | TerminalMode::AutoNewLine
            | TerminalMode::AltSendsEscape
            | TerminalMode::BracketedPasteMode
            | TerminalMode::AutoWrap
            | TerminalMode::OriginMode
            | TerminalMode::InsertMode => {}
            TerminalMode::Null
            | TerminalMode::Ansi
            | TerminalMode::SmoothScroll
            | TerminalMode::ReverseVideo
            | TerminalMode::AutoRepeatKeys
            | TerminalMode::Interlace
            | TerminalMode::CursorBlinking
            | TerminalMode::AllowWideColumn
            | TerminalMode::ReverseWrapAround
            | TerminalMode::KeyboardAction
            | TerminalMode::SendReceive
            | TerminalMode::EightBitInput => {
                trace!("mode {:?} has no side effect", self);
            }
        }
    }
}

/// Packed per-session mode flags
///
/// One bit per `TerminalMode` variant, indexed by the enum itself rather than
/// a separate `bitflags!` list, so adding a mode needs no second table.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModeSet(u32);

impl ModeSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, mode: TerminalMode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn set(&mut self, mode: TerminalMode, enabled: bool) {
        if enabled {
            self.0 |= mode.bit();
        } else {
            self.0 &= !mode.bit();
        }
    }

    #[must_use]
    pub fn with(mut self, mode: TerminalMode) -> Self {
        self.set(mode, true);
        self
    }

    pub fn iter(self) -> impl Iterator<Item = TerminalMode> {
        TerminalMode::ALL.into_iter().filter(move |m| self.contains(*m))
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Mode snapshot shared with other threads.
///
/// The interpreter publishes; readers always see a whole `ModeSet`.
#[derive(Clone, Default)]
pub struct SharedModes(Arc<AtomicU32>);

impl SharedModes {
    pub fn new(initial: ModeSet) -> Self {
        Self(Arc::new(AtomicU32::new(initial.bits())))
    }

    pub fn publish(&self, modes: ModeSet) {
        self.0.store(modes.bits(), Ordering::Release);
    }

    pub fn snapshot(&self) -> ModeSet {
        ModeSet(self.0.load(Ordering::Acquire))
    }
}

impl fmt::Debug for SharedModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedModes").field(&self.snapshot()).finish()
    }
}

//! Terminal color values
//!
//! A [`TerminalColor`] is one of:
//! - a palette index (`Indexed`), resolved by whoever holds the palette
//! - an explicit RGB value (`Explicit`)
//! - a semantic palette role (`Resolved`), evaluated lazily against a palette
//!
//! Indices 0-255 are interned: every `TerminalColor::index(n)` for the same `n`
//! shares one allocation.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Palette;

/// Color errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    #[error("indexed color {0} has no RGB value without a palette lookup")]
    UnresolvedIndex(i32),

    #[error("unknown color scheme: {0}")]
    UnknownScheme(String),
}

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a `0xRRGGBB` literal
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: (hex >> 16) as u8,
            g: (hex >> 8) as u8,
            b: hex as u8,
        }
    }

    /// Pack into `0x00RRGGBB`
    pub const fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// Semantic palette slot for deferred colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    Foreground,
    Background,
    Cursor,
    SelectionForeground,
    SelectionBackground,
}

#[derive(Debug)]
enum ColorKind {
    Indexed(i32),
    Explicit(Rgb),
    Resolved(ColorRole),
}

/// Immutable, cheaply cloned terminal color
#[derive(Clone)]
pub struct TerminalColor {
    kind: Arc<ColorKind>,
}

static INDEXED: Lazy<Vec<TerminalColor>> =
    Lazy::new(|| (0..256).map(|i| TerminalColor::alloc(ColorKind::Indexed(i))).collect());

impl TerminalColor {
    fn alloc(kind: ColorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    /// Palette index color. 0-255 return the interned instance.
    pub fn index(index: i32) -> Self {
        match usize::try_from(index).ok().and_then(|i| INDEXED.get(i)) {
            Some(color) => color.clone(),
            None => Self::alloc(ColorKind::Indexed(index)),
        }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgb(Rgb::new(r, g, b))
    }

    pub fn from_rgb(rgb: Rgb) -> Self {
        Self::alloc(ColorKind::Explicit(rgb))
    }

    /// Deferred color. Every call yields a distinct identity.
    pub fn resolved(role: ColorRole) -> Self {
        Self::alloc(ColorKind::Resolved(role))
    }

    /// Assemble a color from optional parts.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one of `index`, `rgb` and `role` is `Some`.
    pub fn from_parts(index: Option<i32>, rgb: Option<Rgb>, role: Option<ColorRole>) -> Self {
        match (index, rgb, role) {
            (Some(index), None, None) => Self::index(index),
            (None, Some(rgb), None) => Self::from_rgb(rgb),
            (None, None, Some(role)) => Self::resolved(role),
            parts => panic!("a terminal color needs exactly one of index, rgb or role, got {parts:?}"),
        }
    }

    pub fn as_index(&self) -> Option<i32> {
        match *self.kind {
            ColorKind::Indexed(index) => Some(index),
            _ => None,
        }
    }

    pub fn as_rgb(&self) -> Option<Rgb> {
        match *self.kind {
            ColorKind::Explicit(rgb) => Some(rgb),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<ColorRole> {
        match *self.kind {
            ColorKind::Resolved(role) => Some(role),
            _ => None,
        }
    }

    /// Concrete RGB for explicit and deferred colors.
    ///
    /// Indexed colors fail: callers resolve them through a palette table.
    pub fn to_rgb(&self, palette: &Palette) -> Result<Rgb, ColorError> {
        match *self.kind {
            ColorKind::Indexed(index) => Err(ColorError::UnresolvedIndex(index)),
            ColorKind::Explicit(rgb) => Ok(rgb),
            ColorKind::Resolved(role) => Ok(palette.role(role)),
        }
    }

    /// True when both values share one allocation
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.kind, &other.kind)
    }
}

impl PartialEq for TerminalColor {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.kind, &*other.kind) {
            (ColorKind::Indexed(a), ColorKind::Indexed(b)) => a == b,
            (ColorKind::Explicit(a), ColorKind::Explicit(b)) => a == b,
            (ColorKind::Resolved(_), ColorKind::Resolved(_)) => self.same_instance(other),
            _ => false,
        }
    }
}

impl Eq for TerminalColor {}

impl fmt::Debug for TerminalColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.kind {
            ColorKind::Indexed(index) => write!(f, "Indexed({index})"),
            ColorKind::Explicit(rgb) => write!(f, "Rgb({}, {}, {})", rgb.r, rgb.g, rgb.b),
            ColorKind::Resolved(role) => write!(f, "Resolved({role:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_is_interned() {
        for i in [0, 7, 128, 255] {
            assert!(TerminalColor::index(i).same_instance(&TerminalColor::index(i)));
        }
    }

    #[test]
    fn test_out_of_range_index_is_fresh() {
        for i in [300, -1] {
            let a = TerminalColor::index(i);
            let b = TerminalColor::index(i);
            assert!(!a.same_instance(&b));
            assert_eq!(a, b);
            assert_eq!(a.as_index(), Some(i));
        }
    }

    #[test]
    fn test_equality() {
        assert_eq!(TerminalColor::index(3), TerminalColor::index(3));
        assert_ne!(TerminalColor::index(3), TerminalColor::index(4));
        assert_eq!(TerminalColor::rgb(1, 2, 3), TerminalColor::rgb(1, 2, 3));
        assert_ne!(TerminalColor::rgb(1, 2, 3), TerminalColor::index(3));

        let cursor = TerminalColor::resolved(ColorRole::Cursor);
        assert_eq!(cursor, cursor.clone());
        assert_ne!(cursor, TerminalColor::resolved(ColorRole::Cursor));
    }

    #[test]
    fn test_to_rgb() {
        let palette = Palette::default();
        assert_eq!(
            TerminalColor::rgb(10, 20, 30).to_rgb(&palette),
            Ok(Rgb::new(10, 20, 30))
        );
        assert_eq!(
            TerminalColor::resolved(ColorRole::Background).to_rgb(&palette),
            Ok(palette.background)
        );
        assert_eq!(
            TerminalColor::index(5).to_rgb(&palette),
            Err(ColorError::UnresolvedIndex(5))
        );
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            TerminalColor::from_parts(Some(12), None, None),
            TerminalColor::index(12)
        );
        assert_eq!(
            TerminalColor::from_parts(None, Some(Rgb::from_hex(0x102030)), None).as_rgb(),
            Some(Rgb::new(0x10, 0x20, 0x30))
        );
        assert_eq!(
            TerminalColor::from_parts(None, None, Some(ColorRole::Cursor)).role(),
            Some(ColorRole::Cursor)
        );
    }

    #[test]
    #[should_panic]
    fn test_from_parts_rejects_empty() {
        TerminalColor::from_parts(None, None, None);
    }

    #[test]
    #[should_panic]
    fn test_from_parts_rejects_multiple() {
        TerminalColor::from_parts(Some(1), Some(Rgb::new(0, 0, 0)), None);
    }

    #[test]
    fn test_rgb_packing() {
        let rgb = Rgb::from_hex(0xab_cd_ef);
        assert_eq!(rgb, Rgb::new(0xab, 0xcd, 0xef));
        assert_eq!(rgb.packed(), 0xab_cd_ef);
    }
}

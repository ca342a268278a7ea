//! Color conversion for rendering
//!
//! Turns [`TerminalColor`]s into crossterm colors under an explicit palette.
//! Indexed colors go through a 256-entry table swapped whole when the palette
//! changes; explicit colors go through a small LRU.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossterm::style::Color;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::{ColorDepth, Palette};
use crate::core::term::{Rgb, TerminalColor};

const LRU_CAPACITY: usize = 512;

/// Indexed colors resolved under one palette
struct IndexedTable {
    palette: Arc<Palette>,
    colors: Vec<Color>,
}

impl IndexedTable {
    fn build(palette: Arc<Palette>, depth: ColorDepth) -> Self {
        let colors = (0..256)
            .map(|index| match depth {
                ColorDepth::Ansi256 => Color::AnsiValue(index as u8),
                ColorDepth::TrueColor => palette.indexed(index).map_or(Color::Reset, to_crossterm),
            })
            .collect();
        Self { palette, colors }
    }
}

#[derive(Default)]
struct Lru {
    entries: HashMap<u32, (Color, u64)>,
    tick: u64,
}

impl Lru {
    fn get(&mut self, key: u32) -> Option<Color> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&key).map(|(color, used)| {
            *used = tick;
            *color
        })
    }

    fn insert(&mut self, key: u32, color: Color) {
        if self.entries.len() >= LRU_CAPACITY {
            let oldest = self.entries.iter().min_by_key(|(_, (_, used))| *used).map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(key, (color, self.tick));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct ColorCache {
    depth: ColorDepth,
    indexed: ArcSwap<IndexedTable>,
    explicit: Mutex<Lru>,
}

impl ColorCache {
    pub fn new(depth: ColorDepth) -> Self {
        Self {
            depth,
            indexed: ArcSwap::from_pointee(IndexedTable::build(Arc::new(Palette::default()), depth)),
            explicit: Mutex::new(Lru::default()),
        }
    }

    pub fn depth(&self) -> ColorDepth {
        self.depth
    }

    /// Install the palette from a lookup, using the default palette if it failed
    pub fn apply_palette<E: Display>(&self, palette: Result<Palette, E>) -> Arc<Palette> {
        let palette = match palette {
            Ok(palette) => Arc::new(palette),
            Err(e) => {
                warn!("Palette unavailable, using default: {}", e);
                Arc::new(Palette::default())
            }
        };
        self.indexed
            .store(Arc::new(IndexedTable::build(Arc::clone(&palette), self.depth)));
        palette
    }

    pub fn convert_color(&self, color: &TerminalColor, palette: &Arc<Palette>) -> Color {
        if let Some(index) = color.as_index() {
            return self.convert_indexed(index, palette);
        }
        match color.to_rgb(palette) {
            Ok(rgb) => self.convert_rgb(rgb),
            Err(e) => {
                trace!("unresolvable color: {}", e);
                Color::Reset
            }
        }
    }

    fn convert_indexed(&self, index: i32, palette: &Arc<Palette>) -> Color {
        let Ok(slot) = usize::try_from(index) else {
            return Color::Reset;
        };
        let mut table = self.indexed.load_full();
        if !Arc::ptr_eq(&table.palette, palette) {
            trace!("palette changed, rebuilding indexed table");
            table = Arc::new(IndexedTable::build(Arc::clone(palette), self.depth));
            self.indexed.store(Arc::clone(&table));
        }
        table.colors.get(slot).copied().unwrap_or(Color::Reset)
    }

    fn convert_rgb(&self, rgb: Rgb) -> Color {
        let key = rgb.packed();
        let mut lru = self.explicit.lock();
        if let Some(color) = lru.get(key) {
            return color;
        }
        let color = match self.depth {
            ColorDepth::TrueColor => to_crossterm(rgb),
            ColorDepth::Ansi256 => Color::AnsiValue(nearest_ansi256(rgb)),
        };
        lru.insert(key, color);
        color
    }

    #[cfg(test)]
    fn cached_explicit(&self) -> usize {
        self.explicit.lock().len()
    }
}

fn to_crossterm(rgb: Rgb) -> Color {
    Color::Rgb {
        r: rgb.r,
        g: rgb.g,
        b: rgb.b,
    }
}

/// Closest xterm-256 entry from the color cube or the gray ramp
pub fn nearest_ansi256(rgb: Rgb) -> u8 {
    const LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

    fn cube_step(v: u8) -> usize {
        match v {
            0..=47 => 0,
            48..=114 => 1,
            _ => (v as usize - 35) / 40,
        }
    }

    fn distance(a: Rgb, b: Rgb) -> u32 {
        let d = |x: u8, y: u8| (x as i32 - y as i32).pow(2) as u32;
        d(a.r, b.r) + d(a.g, b.g) + d(a.b, b.b)
    }

    let (r, g, b) = (cube_step(rgb.r), cube_step(rgb.g), cube_step(rgb.b));
    let cube = Rgb::new(LEVELS[r], LEVELS[g], LEVELS[b]);
    let cube_index = 16 + 36 * r + 6 * g + b;

    let average = (rgb.r as u32 + rgb.g as u32 + rgb.b as u32) / 3;
    let gray_step = if average > 238 { 23 } else { average.saturating_sub(3) / 10 };
    let level = (8 + 10 * gray_step) as u8;
    let gray = Rgb::new(level, level, level);
    let gray_index = 232 + gray_step as usize;

    if distance(rgb, gray) < distance(rgb, cube) {
        gray_index as u8
    } else {
        cube_index as u8
    }
}

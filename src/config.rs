//! Configuration and palette management for termcore.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.termcore/config.toml`
//! - Built-in palettes (default, solarized, monokai, nord, etc.)
//! - Per-role color overrides on top of a palette
//!
//! # Configuration File
//!
//! ```toml
//! # latency | throughput | balanced
//! performance_mode = "balanced"
//! compaction_threshold = 4096
//! scrollback_limit = 10000
//! log_level = "info"
//!
//! # default, solarized-dark, solarized-light, monokai,
//! # nord, dracula, gruvbox-dark, tokyo-night
//! color_scheme = "tokyo-night"
//! # truecolor | ansi256
//! color_depth = "truecolor"
//!
//! [terminal]
//! cols = 80
//! rows = 24
//!
//! [colors]
//! foreground = { rgb = [220, 220, 220] }
//! background = { index = 0 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::stream::{PerformanceMode, DEFAULT_COMPACTION_THRESHOLD};
use crate::core::term::state::DEFAULT_SCROLLBACK_LIMIT;
use crate::core::term::{ColorError, ColorRole, Rgb, TerminalColor};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error(transparent)]
    Color(#[from] ColorError),

    #[error("could not determine config path")]
    NoConfigPath,
}

/// Color capability of the render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorDepth {
    #[default]
    TrueColor,
    Ansi256,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub performance_mode: PerformanceMode,
    /// Consumed stream bytes kept before compaction
    pub compaction_threshold: usize,
    pub scrollback_limit: usize,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub color_scheme: String,
    pub color_depth: ColorDepth,
    pub terminal: TerminalConfig,
    pub colors: ColorOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            performance_mode: PerformanceMode::default(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            log_level: "info".to_string(),
            color_scheme: "default".to_string(),
            color_depth: ColorDepth::default(),
            terminal: TerminalConfig::default(),
            colors: ColorOverrides::default(),
        }
    }
}

/// Terminal size configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Optional per-role overrides of the palette
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<ColorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<ColorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<ColorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_foreground: Option<ColorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_background: Option<ColorSpec>,
}

/// A color in the config file: exactly one of `index` or `rgb`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb: Option<[u8; 3]>,
}

impl ColorSpec {
    pub fn to_color(&self, field: &str) -> Result<TerminalColor, ConfigError> {
        if self.index.is_some() == self.rgb.is_some() {
            return Err(ConfigError::InvalidColor(format!(
                "`{field}` needs exactly one of `index` or `rgb`"
            )));
        }
        if let Some(index) = self.index {
            if !(0..=255).contains(&index) {
                return Err(ConfigError::InvalidColor(format!(
                    "`{field}` index {index} is outside 0-255"
                )));
            }
        }
        Ok(TerminalColor::from_parts(self.index, self.rgb.map(Rgb::from), None))
    }
}

impl Config {
    /// Load `~/.termcore/config.toml`, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to `~/.termcore/config.toml`
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigPath)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".termcore"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("termcore.log"))
    }

    /// The configured palette with overrides applied
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        let mut palette = Palette::by_name(&self.color_scheme)?;
        let overrides = [
            ("foreground", self.colors.foreground, ColorRole::Foreground),
            ("background", self.colors.background, ColorRole::Background),
            ("cursor", self.colors.cursor, ColorRole::Cursor),
            ("selection_foreground", self.colors.selection_foreground, ColorRole::SelectionForeground),
            ("selection_background", self.colors.selection_background, ColorRole::SelectionBackground),
        ];
        for (field, spec, role) in overrides {
            let Some(spec) = spec else { continue };
            let color = spec.to_color(field)?;
            let rgb = palette.rgb_of(&color).ok_or_else(|| {
                ConfigError::InvalidColor(format!("`{field}` does not resolve to a color"))
            })?;
            palette.set_role(role, rgb);
        }
        Ok(palette)
    }
}

/// Concrete colors behind palette indices and semantic roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub name: String,
    /// Indices 0-15
    pub ansi: [Rgb; 16],
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
    pub selection_foreground: Rgb,
    pub selection_background: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self::default_scheme()
    }
}

/// Channel levels of the xterm 6x6x6 color cube
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

impl Palette {
    fn scheme(name: &str, ansi: [u32; 16], fg: u32, bg: u32, sel_fg: u32, sel_bg: u32) -> Self {
        Self {
            name: name.to_string(),
            ansi: ansi.map(Rgb::from_hex),
            foreground: Rgb::from_hex(fg),
            background: Rgb::from_hex(bg),
            cursor: Rgb::from_hex(fg),
            selection_foreground: Rgb::from_hex(sel_fg),
            selection_background: Rgb::from_hex(sel_bg),
        }
    }

    /// xterm defaults
    pub fn default_scheme() -> Self {
        Self::scheme(
            "default",
            [
                0x000000, 0xcd0000, 0x00cd00, 0xcdcd00, 0x0000ee, 0xcd00cd, 0x00cdcd, 0xe5e5e5,
                0x7f7f7f, 0xff0000, 0x00ff00, 0xffff00, 0x5c5cff, 0xff00ff, 0x00ffff, 0xffffff,
            ],
            0xe5e5e5,
            0x000000,
            0x000000,
            0xffffff,
        )
    }

    pub fn solarized_dark() -> Self {
        Self::scheme(
            "solarized-dark",
            [
                0x073642, 0xdc322f, 0x859900, 0xb58900, 0x268bd2, 0xd33682, 0x2aa198, 0xeee8d5,
                0x002b36, 0xcb4b16, 0x586e75, 0x657b83, 0x839496, 0x6c71c4, 0x93a1a1, 0xfdf6e3,
            ],
            0x839496,
            0x002b36,
            0xfdf6e3,
            0x268bd2,
        )
    }

    pub fn solarized_light() -> Self {
        Self::scheme(
            "solarized-light",
            [
                0x073642, 0xdc322f, 0x859900, 0xb58900, 0x268bd2, 0xd33682, 0x2aa198, 0xeee8d5,
                0x002b36, 0xcb4b16, 0x586e75, 0x657b83, 0x839496, 0x6c71c4, 0x93a1a1, 0xfdf6e3,
            ],
            0x657b83,
            0xfdf6e3,
            0xfdf6e3,
            0x268bd2,
        )
    }

    pub fn monokai() -> Self {
        Self::scheme(
            "monokai",
            [
                0x272822, 0xf92672, 0xa6e22e, 0xf4bf75, 0x66d9ef, 0xae81ff, 0xa1efe4, 0xf8f8f2,
                0x75715e, 0xf92672, 0xa6e22e, 0xf4bf75, 0x66d9ef, 0xae81ff, 0xa1efe4, 0xf9f8f5,
            ],
            0xf8f8f2,
            0x272822,
            0xf8f8f2,
            0x49483e,
        )
    }

    pub fn nord() -> Self {
        Self::scheme(
            "nord",
            [
                0x3b4252, 0xbf616a, 0xa3be8c, 0xebcb8b, 0x81a1c1, 0xb48ead, 0x88c0d0, 0xe5e9f0,
                0x4c566a, 0xbf616a, 0xa3be8c, 0xebcb8b, 0x81a1c1, 0xb48ead, 0x8fbcbb, 0xeceff4,
            ],
            0xd8dee9,
            0x2e3440,
            0xeceff4,
            0x4c566a,
        )
    }

    pub fn dracula() -> Self {
        Self::scheme(
            "dracula",
            [
                0x21222c, 0xff5555, 0x50fa7b, 0xf1fa8c, 0xbd93f9, 0xff79c6, 0x8be9fd, 0xf8f8f2,
                0x6272a4, 0xff6e6e, 0x69ff94, 0xffffa5, 0xd6acff, 0xff92df, 0xa4ffff, 0xffffff,
            ],
            0xf8f8f2,
            0x282a36,
            0xf8f8f2,
            0x44475a,
        )
    }

    pub fn gruvbox_dark() -> Self {
        Self::scheme(
            "gruvbox-dark",
            [
                0x282828, 0xcc241d, 0x98971a, 0xd79921, 0x458588, 0xb16286, 0x689d6a, 0xa89984,
                0x928374, 0xfb4934, 0xb8bb26, 0xfabd2f, 0x83a598, 0xd3869b, 0x8ec07c, 0xebdbb2,
            ],
            0xebdbb2,
            0x282828,
            0xebdbb2,
            0x665c54,
        )
    }

    pub fn tokyo_night() -> Self {
        Self::scheme(
            "tokyo-night",
            [
                0x15161e, 0xf7768e, 0x9ece6a, 0xe0af68, 0x7aa2f7, 0xbb9af7, 0x7dcfff, 0xa9b1d6,
                0x414868, 0xf7768e, 0x9ece6a, 0xe0af68, 0x7aa2f7, 0xbb9af7, 0x7dcfff, 0xc0caf5,
            ],
            0xc0caf5,
            0x1a1b26,
            0xc0caf5,
            0x333b5b,
        )
    }

    /// Get palette by name
    pub fn by_name(name: &str) -> Result<Self, ColorError> {
        match name.to_lowercase().as_str() {
            "default" => Ok(Self::default_scheme()),
            "solarized-dark" | "solarized_dark" => Ok(Self::solarized_dark()),
            "solarized-light" | "solarized_light" => Ok(Self::solarized_light()),
            "monokai" => Ok(Self::monokai()),
            "nord" => Ok(Self::nord()),
            "dracula" => Ok(Self::dracula()),
            "gruvbox-dark" | "gruvbox_dark" | "gruvbox" => Ok(Self::gruvbox_dark()),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Ok(Self::tokyo_night()),
            _ => Err(ColorError::UnknownScheme(name.to_string())),
        }
    }

    /// List available palettes
    pub fn list() -> &'static [&'static str] {
        &[
            "default",
            "solarized-dark",
            "solarized-light",
            "monokai",
            "nord",
            "dracula",
            "gruvbox-dark",
            "tokyo-night",
        ]
    }

    /// RGB of xterm index `index`: 16 palette colors, the color cube, the gray ramp
    pub fn indexed(&self, index: i32) -> Option<Rgb> {
        match index {
            0..=15 => Some(self.ansi[index as usize]),
            16..=231 => {
                let n = (index - 16) as usize;
                Some(Rgb::new(
                    CUBE_LEVELS[n / 36],
                    CUBE_LEVELS[(n / 6) % 6],
                    CUBE_LEVELS[n % 6],
                ))
            }
            232..=255 => {
                let level = 8 + 10 * (index - 232) as u8;
                Some(Rgb::new(level, level, level))
            }
            _ => None,
        }
    }

    pub fn role(&self, role: ColorRole) -> Rgb {
        match role {
            ColorRole::Foreground => self.foreground,
            ColorRole::Background => self.background,
            ColorRole::Cursor => self.cursor,
            ColorRole::SelectionForeground => self.selection_foreground,
            ColorRole::SelectionBackground => self.selection_background,
        }
    }

    pub fn set_role(&mut self, role: ColorRole, rgb: Rgb) {
        match role {
            ColorRole::Foreground => self.foreground = rgb,
            ColorRole::Background => self.background = rgb,
            ColorRole::Cursor => self.cursor = rgb,
            ColorRole::SelectionForeground => self.selection_foreground = rgb,
            ColorRole::SelectionBackground => self.selection_background = rgb,
        }
    }

    /// RGB of any color under this palette; `None` for unknown indices
    pub fn rgb_of(&self, color: &TerminalColor) -> Option<Rgb> {
        match color.as_index() {
            Some(index) => self.indexed(index),
            None => color.to_rgb(self).ok(),
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.performance_mode, PerformanceMode::Balanced);
        assert_eq!(config.compaction_threshold, 4096);
        assert_eq!(config.scrollback_limit, 10_000);
        assert_eq!(config.color_depth, ColorDepth::TrueColor);
        assert_eq!((config.terminal.cols, config.terminal.rows), (80, 24));
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml_str(
            r#"
            performance_mode = "throughput"
            compaction_threshold = 1024
            color_scheme = "nord"
            color_depth = "ansi256"

            [terminal]
            cols = 120

            [colors]
            foreground = { rgb = [220, 220, 220] }
            background = { index = 1 }
            "#,
        )
        .unwrap();
        assert_eq!(config.performance_mode, PerformanceMode::Throughput);
        assert_eq!(config.compaction_threshold, 1024);
        assert_eq!(config.color_depth, ColorDepth::Ansi256);
        assert_eq!((config.terminal.cols, config.terminal.rows), (120, 24));

        let palette = config.palette().unwrap();
        assert_eq!(palette.name, "nord");
        assert_eq!(palette.foreground, Rgb::new(220, 220, 220));
        assert_eq!(palette.background, Palette::nord().ansi[1]);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_toml_str("performance_mode = \"fast\""),
            Err(ConfigError::Parse(_))
        ));

        let config = Config::from_toml_str("[colors]\ncursor = { index = 1, rgb = [0, 0, 0] }").unwrap();
        assert!(matches!(config.palette(), Err(ConfigError::InvalidColor(_))));

        let config = Config::from_toml_str("[colors]\ncursor = { index = 300 }").unwrap();
        assert!(matches!(config.palette(), Err(ConfigError::InvalidColor(_))));

        let config = Config::from_toml_str("color_scheme = \"neon\"").unwrap();
        assert!(matches!(
            config.palette(),
            Err(ConfigError::Color(ColorError::UnknownScheme(_)))
        ));
    }

    #[test]
    fn test_xterm_indices() {
        let palette = Palette::default();
        assert_eq!(palette.indexed(1), Some(Rgb::new(0xcd, 0, 0)));
        assert_eq!(palette.indexed(16), Some(Rgb::new(0, 0, 0)));
        assert_eq!(palette.indexed(196), Some(Rgb::new(255, 0, 0)));
        assert_eq!(palette.indexed(231), Some(Rgb::new(255, 255, 255)));
        assert_eq!(palette.indexed(232), Some(Rgb::new(8, 8, 8)));
        assert_eq!(palette.indexed(255), Some(Rgb::new(238, 238, 238)));
        assert_eq!(palette.indexed(256), None);
        assert_eq!(palette.indexed(-1), None);
    }

    #[test]
    fn test_every_listed_scheme_loads() {
        for name in Palette::list() {
            assert_eq!(Palette::by_name(name).unwrap().name, *name);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("termcore-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = Config::default();
        config.color_scheme = "dracula".to_string();
        config.colors.cursor = Some(ColorSpec {
            index: None,
            rgb: Some([1, 2, 3]),
        });
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.color_scheme, "dracula");
        assert_eq!(loaded.colors.cursor, config.colors.cursor);
        assert_eq!(loaded.palette().unwrap().cursor, Rgb::new(1, 2, 3));
        let _ = fs::remove_dir_all(dir);
    }
}

//! Text styles attached to buffer cells

use bitflags::bitflags;

use super::color::TerminalColor;

bitflags! {
    /// Independent rendition attributes
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StyleOptions: u16 {
        const BOLD        = 0b0000_0000_0001;
        const ITALIC      = 0b0000_0000_0010;
        const SLOW_BLINK  = 0b0000_0000_0100;
        const RAPID_BLINK = 0b0000_0000_1000;
        const DIM         = 0b0000_0001_0000;
        const INVERSE     = 0b0000_0010_0000;
        const UNDERLINE   = 0b0000_0100_0000;
        const HIDDEN      = 0b0000_1000_0000;
        const PROTECTED   = 0b0001_0000_0000;
    }
}

/// Immutable style: optional colors plus attribute set.
///
/// New styles are derived with [`TextStyle::to_builder`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextStyle {
    foreground: Option<TerminalColor>,
    background: Option<TerminalColor>,
    options: StyleOptions,
}

impl TextStyle {
    pub const EMPTY: TextStyle = TextStyle {
        foreground: None,
        background: None,
        options: StyleOptions::empty(),
    };

    pub fn new(
        foreground: Option<TerminalColor>,
        background: Option<TerminalColor>,
        options: StyleOptions,
    ) -> Self {
        Self {
            foreground,
            background,
            options,
        }
    }

    pub fn foreground(&self) -> Option<&TerminalColor> {
        self.foreground.as_ref()
    }

    pub fn background(&self) -> Option<&TerminalColor> {
        self.background.as_ref()
    }

    pub fn options(&self) -> StyleOptions {
        self.options
    }

    pub fn has_option(&self, option: StyleOptions) -> bool {
        self.options.contains(option)
    }

    /// Same colors, no attributes
    pub fn create_empty_with_colors(&self) -> Self {
        Self {
            foreground: self.foreground.clone(),
            background: self.background.clone(),
            options: StyleOptions::empty(),
        }
    }

    pub fn to_builder(&self) -> TextStyleBuilder {
        TextStyleBuilder {
            style: self.clone(),
        }
    }
}

/// Copy-then-mutate builder for [`TextStyle`]
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct TextStyleBuilder {
    style: TextStyle,
}

impl TextStyleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_foreground(mut self, color: Option<TerminalColor>) -> Self {
        self.style.foreground = color;
        self
    }

    pub fn set_background(mut self, color: Option<TerminalColor>) -> Self {
        self.style.background = color;
        self
    }

    pub fn set_option(mut self, option: StyleOptions, enabled: bool) -> Self {
        self.style.options.set(option, enabled);
        self
    }

    pub fn build(self) -> TextStyle {
        self.style
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_sets_option() {
        let style = TextStyle::EMPTY
            .to_builder()
            .set_option(StyleOptions::BOLD, true)
            .build();
        assert!(style.has_option(StyleOptions::BOLD));
        assert_eq!(style, TextStyle::new(None, None, StyleOptions::BOLD));
    }

    #[test]
    fn test_builder_leaves_source_untouched() {
        let base = TextStyle::new(Some(TerminalColor::index(1)), None, StyleOptions::ITALIC);
        let derived = base
            .to_builder()
            .set_option(StyleOptions::ITALIC, false)
            .set_background(Some(TerminalColor::rgb(0, 0, 0)))
            .build();

        assert!(base.has_option(StyleOptions::ITALIC));
        assert_eq!(base.background(), None);
        assert!(!derived.has_option(StyleOptions::ITALIC));
        assert_eq!(derived.foreground(), Some(&TerminalColor::index(1)));
    }

    #[test]
    fn test_create_empty_with_colors() {
        let style = TextStyle::new(
            Some(TerminalColor::index(2)),
            Some(TerminalColor::index(4)),
            StyleOptions::BOLD | StyleOptions::UNDERLINE,
        );
        let plain = style.create_empty_with_colors();
        assert_eq!(plain.options(), StyleOptions::empty());
        assert_eq!(plain.foreground(), style.foreground());
        assert_eq!(plain.background(), style.background());
    }

    #[test]
    fn test_has_option_requires_all_bits() {
        let style = TextStyle::new(None, None, StyleOptions::BOLD);
        assert!(!style.has_option(StyleOptions::BOLD | StyleOptions::DIM));
        assert_eq!(TextStyle::default(), TextStyle::EMPTY);
    }
}

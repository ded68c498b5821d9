//! Attribute and color pair model
//!
//! A style is a single `u32` word: the attribute bits OR-ed with the color
//! pair index shifted into bits 8..16. Pair 0 is the terminal default and
//! contributes no bits.

use bitflags::bitflags;

use super::session::TerminalError;

bitflags! {
    /// Independent visual toggles, laid out like the classic curses `A_*` bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Attr: u32 {
        const STANDOUT   = 1 << 16;
        const UNDERLINE  = 1 << 17;
        const REVERSE    = 1 << 18;
        const BLINK      = 1 << 19;
        const DIM        = 1 << 20;
        const BOLD       = 1 << 21;
        const ALTCHARSET = 1 << 22;
        const INVISIBLE  = 1 << 23;
        const PROTECT    = 1 << 24;
    }
}

/// Bits of a style word holding the color pair index.
pub const PAIR_MASK: u32 = 0x0000_ff00;
const PAIR_SHIFT: u32 = 8;

/// Number of addressable color pairs (handle 0 included).
pub const MAX_PAIRS: usize = 256;

impl Attr {
    /// Flag names accepted in configuration files.
    pub const NAMED: [(&'static str, Attr); 9] = [
        ("standout", Attr::STANDOUT),
        ("underline", Attr::UNDERLINE),
        ("reverse", Attr::REVERSE),
        ("blink", Attr::BLINK),
        ("dim", Attr::DIM),
        ("bold", Attr::BOLD),
        ("altcharset", Attr::ALTCHARSET),
        ("invisible", Attr::INVISIBLE),
        ("protect", Attr::PROTECT),
    ];

    /// Look up a single flag by name (case-insensitive).
    pub fn from_config_name(name: &str) -> Option<Attr> {
        let name = name.trim().to_ascii_lowercase();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }

    /// Parse a list of flag names into one mask.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Attr, String> {
        names.iter().try_fold(Attr::empty(), |acc, name| {
            Attr::from_config_name(name.as_ref())
                .map(|flag| acc | flag)
                .ok_or_else(|| name.as_ref().to_string())
        })
    }
}

/// Compose an attribute mask and a color pair into the style word.
pub fn style_word(attr: Attr, pair: u8) -> u32 {
    attr.bits() | (u32::from(pair) << PAIR_SHIFT)
}

/// Split a style word back into its attribute bits and pair index.
pub fn split_style(word: u32) -> (Attr, u8) {
    let pair = ((word & PAIR_MASK) >> PAIR_SHIFT) as u8;
    (Attr::from_bits_truncate(word), pair)
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    /// Terminal default color (passthrough)
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub const BLACK: Color = Color::Indexed(0);
    pub const RED: Color = Color::Indexed(1);
    pub const GREEN: Color = Color::Indexed(2);
    pub const YELLOW: Color = Color::Indexed(3);
    pub const BLUE: Color = Color::Indexed(4);
    pub const MAGENTA: Color = Color::Indexed(5);
    pub const CYAN: Color = Color::Indexed(6);
    pub const WHITE: Color = Color::Indexed(7);

    /// Parse a color name, a palette index, or `#rrggbb`.
    pub fn parse(s: &str) -> Option<Color> {
        let s = s.trim().to_ascii_lowercase();
        let named = match s.as_str() {
            "default" | "" => Some(Color::Default),
            "black" => Some(Color::BLACK),
            "red" => Some(Color::RED),
            "green" => Some(Color::GREEN),
            "yellow" => Some(Color::YELLOW),
            "blue" => Some(Color::BLUE),
            "magenta" => Some(Color::MAGENTA),
            "cyan" => Some(Color::CYAN),
            "white" => Some(Color::WHITE),
            _ => None,
        };
        if named.is_some() {
            return named;
        }
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Color::Rgb(r, g, b));
            }
            return None;
        }
        s.parse::<u8>().ok().map(Color::Indexed)
    }

    /// Convert to crossterm color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        match self {
            Color::Default => crossterm::style::Color::Reset,
            Color::Indexed(n) => crossterm::style::Color::AnsiValue(n),
            Color::Rgb(r, g, b) => crossterm::style::Color::Rgb { r, g, b },
        }
    }
}

/// Registered (foreground, background) colors for one pair handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairColors {
    pub fg: Color,
    pub bg: Color,
}

/// Color pair table. Handle 0 is always the default pair.
#[derive(Clone, Debug)]
pub struct ColorPairs {
    pairs: Vec<PairColors>,
}

impl Default for ColorPairs {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorPairs {
    pub fn new() -> Self {
        Self {
            pairs: vec![PairColors::default(); MAX_PAIRS],
        }
    }

    /// Bind `pair` to `(fg, bg)`, replacing any earlier binding.
    pub fn register(&mut self, pair: u8, fg: Color, bg: Color) -> Result<(), TerminalError> {
        if pair == 0 {
            return Err(TerminalError::ReservedPair);
        }
        self.pairs[pair as usize] = PairColors { fg, bg };
        Ok(())
    }

    pub fn get(&self, pair: u8) -> PairColors {
        self.pairs[pair as usize]
    }
}

/// Map an alternate-charset letter to its line drawing glyph.
pub fn acs_glyph(ch: char) -> char {
    match ch {
        'j' => '┘',
        'k' => '┐',
        'l' => '┌',
        'm' => '└',
        'n' => '┼',
        'q' => '─',
        't' => '├',
        'u' => '┤',
        'v' => '┴',
        'w' => '┬',
        'x' => '│',
        'a' => '▒',
        'f' => '°',
        'g' => '±',
        '~' => '·',
        '`' => '◆',
        '0' => '█',
        _ => ch,
    }
}

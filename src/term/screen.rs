//! Screen surface
//!
//! Cursor control, styled line writes and geometry queries on top of an open
//! [`Session`]. Output is queued and only reaches the terminal on
//! [`Screen::refresh`].

use std::fmt;
use std::io::{self, BufWriter, Stdout, Write};
use std::sync::Arc;

use crossterm::{
    cursor::{Hide, MoveTo, SetCursorStyle, Show},
    queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use tracing::debug;
use unicode_width::UnicodeWidthChar;

use super::attr::{acs_glyph, split_style, style_word, Attr, Color, ColorPairs};
use super::session::{Result, Session, Shared, TerminalError};

/// Terminal dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    pub fn contains(&self, row: u16, col: u16) -> bool {
        row < self.rows && col < self.cols
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Output sink that can also query the terminal.
pub trait Console: Write {
    /// Current terminal size.
    fn probe_size(&mut self) -> io::Result<Geometry>;
    /// Real cursor location as (row, col).
    fn probe_cursor(&mut self) -> io::Result<(u16, u16)>;
}

/// Console on the process's standard output.
pub struct TtyConsole {
    out: BufWriter<Stdout>,
}

impl Default for TtyConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl TtyConsole {
    pub fn new() -> Self {
        Self {
            out: BufWriter::with_capacity(16384, io::stdout()),
        }
    }
}

impl Write for TtyConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Console for TtyConsole {
    fn probe_size(&mut self) -> io::Result<Geometry> {
        let (cols, rows) = terminal::size()?;
        Ok(Geometry { rows, cols })
    }

    fn probe_cursor(&mut self) -> io::Result<(u16, u16)> {
        // Pending output may move the cursor, so it must reach the terminal first.
        self.out.flush()?;
        let (col, row) = crossterm::cursor::position()?;
        Ok((row, col))
    }
}

/// Cursor visibility modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorVisibility {
    Invisible,
    #[default]
    Normal,
    VeryVisible,
}

impl CursorVisibility {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "invisible" | "hidden" => Some(Self::Invisible),
            "normal" => Some(Self::Normal),
            "very-visible" | "very_visible" => Some(Self::VeryVisible),
            _ => None,
        }
    }
}

/// Drawing surface bound to an open session.
pub struct Screen<C: Console = TtyConsole> {
    console: C,
    shared: Arc<Shared>,
    geometry: Option<Geometry>,
    cursor: (u16, u16),
    visibility: CursorVisibility,
    pairs: ColorPairs,
    /// Style word used to fill cleared cells
    background: u32,
}

impl Screen<TtyConsole> {
    /// Screen on standard output.
    pub fn new(session: &Session) -> Self {
        Self::with_console(session, TtyConsole::new())
    }
}

impl<C: Console> Screen<C> {
    pub fn with_console(session: &Session, console: C) -> Self {
        Self::from_shared(session.shared(), console)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>, console: C) -> Self {
        Self {
            console,
            shared,
            geometry: None,
            cursor: (0, 0),
            visibility: CursorVisibility::Normal,
            pairs: ColorPairs::new(),
            background: 0,
        }
    }

    /// Current terminal size, re-probed only after a resize.
    pub fn size(&mut self) -> Result<Geometry> {
        self.shared.ensure_active("size")?;
        let dirty = self.shared.resize.take();
        match self.geometry {
            Some(geometry) if !dirty => Ok(geometry),
            _ => {
                let geometry = match self.console.probe_size() {
                    Ok(geometry) => geometry,
                    Err(e) => {
                        // Keep the cached size stale until a probe succeeds.
                        if dirty {
                            self.shared.resize.mark();
                        }
                        return Err(TerminalError::io("size")(e));
                    }
                };
                if self.geometry.is_some() {
                    debug!("terminal resized to {}", geometry);
                }
                self.geometry = Some(geometry);
                Ok(geometry)
            }
        }
    }

    /// Position the logical cursor for the next write.
    pub fn move_cursor(&mut self, row: u16, col: u16) -> Result<()> {
        self.shared.ensure_active("move")?;
        let geometry = self.size()?;
        if !geometry.contains(row, col) {
            return Err(TerminalError::OutOfRange {
                op: "move",
                row,
                col,
                geometry,
            });
        }
        queue!(self.console, MoveTo(col, row)).map_err(TerminalError::io("move"))?;
        self.cursor = (row, col);
        Ok(())
    }

    /// Write at most `max_bytes` of `text` at the cursor in the given style.
    ///
    /// Output is clipped at the right edge of the row. The style also becomes
    /// the fill for later [`Screen::clear_to_end_of_line`] calls.
    pub fn write_text(&mut self, text: &str, max_bytes: usize, attr: Attr, pair: u8) -> Result<()> {
        self.shared.ensure_active("write")?;
        let geometry = self.size()?;
        let (row, col) = self.cursor;
        if !geometry.contains(row, col) {
            // Stale cursor after a shrink; nothing fits.
            return Ok(());
        }

        let text = truncate_at_boundary(text, max_bytes);
        let mut room = usize::from(geometry.cols - col);
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            // Control characters would move the real cursor behind our back.
            let ch = if ch.is_control() {
                '?'
            } else if attr.contains(Attr::ALTCHARSET) {
                acs_glyph(ch)
            } else {
                ch
            };
            let width = ch.width().unwrap_or(0);
            if width > room {
                break;
            }
            room -= width;
            out.push(ch);
        }
        let used = usize::from(geometry.cols - col) - room;

        let word = self.style_word(attr, pair);
        self.apply_style(word).map_err(TerminalError::io("write"))?;
        queue!(self.console, Print(&out)).map_err(TerminalError::io("write"))?;
        self.background = word;
        self.cursor = (row, col + used as u16);
        Ok(())
    }

    /// Clear from the cursor to the end of the line using the fill style.
    pub fn clear_to_end_of_line(&mut self) -> Result<()> {
        self.shared.ensure_active("clear")?;
        self.apply_style(self.background)
            .map_err(TerminalError::io("clear"))?;
        queue!(self.console, Clear(ClearType::UntilNewLine)).map_err(TerminalError::io("clear"))
    }

    /// Clear the whole screen and home the cursor.
    pub fn erase(&mut self) -> Result<()> {
        self.shared.ensure_active("clear")?;
        self.background = 0;
        self.apply_style(0).map_err(TerminalError::io("clear"))?;
        queue!(self.console, Clear(ClearType::All), MoveTo(0, 0))
            .map_err(TerminalError::io("clear"))?;
        self.cursor = (0, 0);
        Ok(())
    }

    pub fn set_cursor_visibility(&mut self, mode: CursorVisibility) -> Result<()> {
        self.shared.ensure_active("cursor")?;
        match mode {
            CursorVisibility::Invisible => queue!(self.console, Hide),
            CursorVisibility::Normal => {
                queue!(self.console, SetCursorStyle::DefaultUserShape, Show)
            }
            CursorVisibility::VeryVisible => {
                queue!(self.console, SetCursorStyle::BlinkingBlock, Show)
            }
        }
        .map_err(TerminalError::io("cursor"))?;
        self.visibility = mode;
        Ok(())
    }

    pub fn cursor_visibility(&self) -> CursorVisibility {
        self.visibility
    }

    /// Read back the terminal's real cursor position as (row, col).
    pub fn cursor_position(&mut self) -> Result<(u16, u16)> {
        self.shared.ensure_active("cursor")?;
        let pos = self
            .console
            .probe_cursor()
            .map_err(TerminalError::io("cursor"))?;
        self.cursor = pos;
        Ok(pos)
    }

    /// Flush queued output to the terminal.
    pub fn refresh(&mut self) -> Result<()> {
        self.shared.ensure_active("refresh")?;
        if self.visibility != CursorVisibility::Invisible {
            let (row, col) = self.cursor;
            queue!(self.console, MoveTo(col, row)).map_err(TerminalError::io("refresh"))?;
        }
        self.console.flush().map_err(TerminalError::io("refresh"))
    }

    /// Bind a color pair handle. Handle 0 is reserved.
    pub fn init_pair(&mut self, pair: u8, fg: Color, bg: Color) -> Result<()> {
        self.pairs.register(pair, fg, bg)
    }

    pub fn has_color(&self) -> bool {
        self.shared.color
    }

    /// Compose attribute bits and a color pair. Without color support the
    /// pair is dropped.
    pub fn style_word(&self, attr: Attr, pair: u8) -> u32 {
        if self.shared.color {
            style_word(attr, pair)
        } else {
            style_word(attr, 0)
        }
    }

    fn apply_style(&mut self, word: u32) -> io::Result<()> {
        let (attr, pair) = split_style(word);
        queue!(self.console, SetAttribute(Attribute::Reset), ResetColor)?;

        if attr.contains(Attr::BOLD) {
            queue!(self.console, SetAttribute(Attribute::Bold))?;
        }
        if attr.contains(Attr::DIM) {
            queue!(self.console, SetAttribute(Attribute::Dim))?;
        }
        if attr.contains(Attr::UNDERLINE) {
            queue!(self.console, SetAttribute(Attribute::Underlined))?;
        }
        if attr.contains(Attr::BLINK) {
            queue!(self.console, SetAttribute(Attribute::SlowBlink))?;
        }
        if attr.intersects(Attr::REVERSE | Attr::STANDOUT) {
            queue!(self.console, SetAttribute(Attribute::Reverse))?;
        }
        if attr.contains(Attr::INVISIBLE) {
            queue!(self.console, SetAttribute(Attribute::Hidden))?;
        }

        if pair != 0 {
            let colors = self.pairs.get(pair);
            if colors.fg != Color::Default {
                queue!(self.console, SetForegroundColor(colors.fg.to_crossterm()))?;
            }
            if colors.bg != Color::Default {
                queue!(self.console, SetBackgroundColor(colors.bg.to_crossterm()))?;
            }
        }
        Ok(())
    }

    /// Write out anything still queued, without the open-session check.
    /// Used right before the session restores the terminal.
    pub(crate) fn flush_pending(&mut self) -> io::Result<()> {
        self.console.flush()
    }

    #[cfg(test)]
    pub(crate) fn console(&self) -> &C {
        &self.console
    }
}

fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

//! Key input
//!
//! [`InputReader::next_key`] blocks until one key arrives. Each attempt
//! waits for the terminal to become readable and then tries a single
//! non-blocking read; a read with nothing usable yields the thread and
//! tries again.
//!
//! Escape sequences are decoded by crossterm. This layer does not
//! reassemble an escape sequence that arrives split into separate events;
//! each event is surfaced on its own.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;

use super::session::{Result, Session, Shared, TerminalError};

/// A decoded input symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    Backspace,
    Delete,
    Insert,
    F(u8),
    /// The terminal changed size
    Resize,
}

/// Result of one non-blocking read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    Ready(Event),
    WouldBlock,
}

/// Raw event source the reader pulls from.
pub trait KeySource {
    /// Block until input is readable.
    fn wait_readable(&mut self) -> io::Result<()>;
    /// Read one event without blocking.
    fn try_read(&mut self) -> io::Result<ReadOutcome>;
}

/// crossterm's event queue on the controlling terminal.
pub struct TerminalKeys {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl TerminalKeys {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl KeySource for TerminalKeys {
    fn wait_readable(&mut self) -> io::Result<()> {
        // Bounded polls so a closed session ends the wait.
        loop {
            if self.shared.ensure_active("input").is_err() {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "session closed"));
            }
            if event::poll(self.poll_interval)? {
                return Ok(());
            }
        }
    }

    fn try_read(&mut self) -> io::Result<ReadOutcome> {
        if event::poll(Duration::ZERO)? {
            Ok(ReadOutcome::Ready(event::read()?))
        } else {
            Ok(ReadOutcome::WouldBlock)
        }
    }
}

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Blocking key reader bound to a session.
pub struct InputReader<S: KeySource = TerminalKeys> {
    source: S,
    shared: Arc<Shared>,
}

impl InputReader<TerminalKeys> {
    pub fn new(session: &Session) -> Self {
        let shared = session.shared();
        Self {
            source: TerminalKeys::new(Arc::clone(&shared)),
            shared,
        }
    }
}

impl<S: KeySource> InputReader<S> {
    pub fn with_source(session: &Session, source: S) -> Self {
        Self::from_shared(session.shared(), source)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>, source: S) -> Self {
        Self { source, shared }
    }

    /// Block until the next key and return it.
    pub fn next_key(&mut self) -> Result<Key> {
        loop {
            self.shared.ensure_active("input")?;
            self.source.wait_readable().map_err(|e| self.read_error(e))?;
            let event = match self.source.try_read().map_err(|e| self.read_error(e))? {
                ReadOutcome::Ready(event) => event,
                ReadOutcome::WouldBlock => {
                    std::thread::yield_now();
                    continue;
                }
            };
            match decode_event(&event) {
                Some(key) => {
                    if key == Key::Resize {
                        self.shared.resize.mark();
                    }
                    return Ok(key);
                }
                None => {
                    debug!("ignoring input event {:?}", event);
                    std::thread::yield_now();
                }
            }
        }
    }

    fn read_error(&self, source: io::Error) -> TerminalError {
        if self.shared.ensure_active("input").is_err() {
            TerminalError::NotOpen { op: "input" }
        } else {
            TerminalError::Io { op: "input", source }
        }
    }
}

/// Map a terminal event to a key, if it is one.
pub fn decode_event(event: &Event) -> Option<Key> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => decode_key(key),
        Event::Resize(_, _) => Some(Key::Resize),
        _ => None,
    }
}

/// Map a crossterm key event to a [`Key`]. Keys with no terminal byte
/// equivalent (media, lock and bare modifier keys) map to `None`.
pub fn decode_key(event: &KeyEvent) -> Option<Key> {
    let mods = Modifiers::from(event.modifiers);
    let key = match event.code {
        KeyCode::Char(ch) => Key::Char(map_char(ch, mods)),
        KeyCode::Enter => Key::Char('\n'),
        KeyCode::Tab => Key::Char('\t'),
        KeyCode::BackTab => Key::Char('\t'),
        KeyCode::Esc => Key::Char('\x1b'),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Delete => Key::Delete,
        KeyCode::Insert => Key::Insert,
        KeyCode::F(n) => Key::F(n),
        KeyCode::Null => Key::Char('\0'),
        // Lock, media and modifier keys send no bytes on a raw tty.
        _ => return None,
    };
    Some(key)
}

/// Apply Ctrl and meta (Alt) to a character the way a raw tty delivers it.
fn map_char(ch: char, mods: Modifiers) -> char {
    if mods.contains(Modifiers::CTRL) {
        let ctrl = match ch {
            'a'..='z' => Some((ch as u8) - b'a' + 1),
            'A'..='Z' => Some((ch as u8) - b'A' + 1),
            '@' | '`' | ' ' => Some(0x00),
            '[' => Some(0x1B),
            '\\' => Some(0x1C),
            ']' => Some(0x1D),
            '^' | '~' => Some(0x1E),
            '_' | '?' => Some(0x1F),
            _ => None,
        };
        if let Some(code) = ctrl {
            return meta(char::from(code), mods);
        }
    }
    meta(ch, mods)
}

// 8-bit meta: Alt sets the high bit of an ASCII character.
fn meta(ch: char, mods: Modifiers) -> char {
    if mods.contains(Modifiers::ALT) && ch.is_ascii() {
        char::from(ch as u8 | 0x80)
    } else {
        ch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{MediaKeyCode, ModifierKeyCode};
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;

    /// Source replaying a script of read outcomes.
    struct ScriptedKeys {
        script: VecDeque<ReadOutcome>,
        waits: usize,
        reads: usize,
    }

    impl ScriptedKeys {
        fn new(script: Vec<ReadOutcome>) -> Self {
            Self {
                script: script.into(),
                waits: 0,
                reads: 0,
            }
        }
    }

    impl KeySource for ScriptedKeys {
        fn wait_readable(&mut self) -> io::Result<()> {
            self.waits += 1;
            Ok(())
        }

        fn try_read(&mut self) -> io::Result<ReadOutcome> {
            self.reads += 1;
            self.script
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
        }
    }

    fn key(code: KeyCode, mods: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, mods))
    }

    fn reader(script: Vec<ReadOutcome>) -> InputReader<ScriptedKeys> {
        InputReader::from_shared(Arc::new(Shared::new(false)), ScriptedKeys::new(script))
    }

    #[test]
    fn test_retries_until_key_arrives() {
        const K: usize = 5;
        let mut script: Vec<ReadOutcome> = (0..K).map(|_| ReadOutcome::WouldBlock).collect();
        script.push(ReadOutcome::Ready(key(KeyCode::Char('p'), KeyModifiers::NONE)));
        let mut reader = reader(script);

        assert_eq!(reader.next_key().unwrap(), Key::Char('p'));
        assert_eq!(reader.source.reads, K + 1);
        assert_eq!(reader.source.waits, K + 1);
    }

    #[test]
    fn test_keys_arrive_in_order() {
        let mut reader = reader(vec![
            ReadOutcome::Ready(key(KeyCode::Up, KeyModifiers::NONE)),
            ReadOutcome::Ready(key(KeyCode::Char('q'), KeyModifiers::NONE)),
        ]);
        assert_eq!(reader.next_key().unwrap(), Key::Up);
        assert_eq!(reader.next_key().unwrap(), Key::Char('q'));
    }

    #[test]
    fn test_non_key_events_are_skipped() {
        let release = Event::Key(KeyEvent::new_with_kind(
            KeyCode::Char('x'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
        ));
        let mut reader = reader(vec![
            ReadOutcome::Ready(Event::FocusGained),
            ReadOutcome::Ready(release),
            ReadOutcome::Ready(key(KeyCode::PageDown, KeyModifiers::NONE)),
        ]);
        assert_eq!(reader.next_key().unwrap(), Key::PageDown);
    }

    #[test]
    fn test_resize_event_marks_geometry() {
        let mut reader = reader(vec![ReadOutcome::Ready(Event::Resize(100, 30))]);
        assert_eq!(reader.next_key().unwrap(), Key::Resize);
        assert!(reader.shared.resize.take());
    }

    #[test]
    fn test_read_error_is_reported() {
        let mut reader = reader(vec![]);
        assert!(matches!(
            reader.next_key(),
            Err(TerminalError::Io { op: "input", .. })
        ));
    }

    #[test]
    fn test_closed_session_stops_reader() {
        let mut reader = reader(vec![ReadOutcome::WouldBlock]);
        reader.shared.active.store(false, Ordering::SeqCst);
        assert!(matches!(
            reader.next_key(),
            Err(TerminalError::NotOpen { op: "input" })
        ));
    }

    #[test]
    fn test_decode_keys() {
        let decode = |code, mods| decode_key(&KeyEvent::new(code, mods)).unwrap();
        assert_eq!(decode(KeyCode::Char('a'), KeyModifiers::NONE), Key::Char('a'));
        assert_eq!(decode(KeyCode::Char('c'), KeyModifiers::CONTROL), Key::Char('\x03'));
        assert_eq!(decode(KeyCode::Char('['), KeyModifiers::CONTROL), Key::Char('\x1b'));
        assert_eq!(decode(KeyCode::Char('x'), KeyModifiers::ALT), Key::Char('\u{f8}'));
        assert_eq!(decode(KeyCode::Enter, KeyModifiers::NONE), Key::Char('\n'));
        assert_eq!(decode(KeyCode::Backspace, KeyModifiers::NONE), Key::Backspace);
        assert_eq!(decode(KeyCode::Home, KeyModifiers::SHIFT), Key::Home);
        assert_eq!(decode(KeyCode::F(5), KeyModifiers::NONE), Key::F(5));
        assert_eq!(decode(KeyCode::Char('é'), KeyModifiers::ALT), Key::Char('é'));
        assert_eq!(decode(KeyCode::Null, KeyModifiers::NONE), Key::Char('\0'));
        assert_eq!(decode(KeyCode::Char(' '), KeyModifiers::CONTROL), Key::Char('\0'));
    }

    #[test]
    fn test_keys_without_bytes_are_skipped() {
        let caps = KeyEvent::new(KeyCode::CapsLock, KeyModifiers::NONE);
        assert_eq!(decode_key(&caps), None);

        let mut reader = reader(vec![
            ReadOutcome::Ready(Event::Key(caps)),
            ReadOutcome::Ready(key(KeyCode::Media(MediaKeyCode::Play), KeyModifiers::NONE)),
            ReadOutcome::Ready(key(
                KeyCode::Modifier(ModifierKeyCode::LeftShift),
                KeyModifiers::SHIFT,
            )),
            ReadOutcome::Ready(key(KeyCode::Char('n'), KeyModifiers::NONE)),
        ]);
        assert_eq!(reader.next_key().unwrap(), Key::Char('n'));
        assert_eq!(reader.source.reads, 4);
    }
}

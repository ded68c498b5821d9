//! Terminal session lifecycle
//!
//! `Session::open` puts the controlling terminal into raw UI mode and
//! `Session::close` restores it. Only one session may be live per process.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossterm::{
    cursor::Show,
    execute,
    style::{Attribute, ResetColor, SetAttribute},
    terminal::{self, DisableLineWrap, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::resize::{ResizeFlag, ResizeNotifier};
use super::screen::Geometry;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("terminal {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("terminal initialization failed: {reason}")]
    Init { reason: String },

    #[error("a terminal session is already open")]
    AlreadyOpen,

    #[error("terminal {op} needs an open session")]
    NotOpen { op: &'static str },

    #[error("terminal {op} to ({row}, {col}) is outside {geometry}")]
    OutOfRange {
        op: &'static str,
        row: u16,
        col: u16,
        geometry: Geometry,
    },

    #[error("color pair 0 is reserved")]
    ReservedPair,
}

impl TerminalError {
    /// Name of the terminal operation that failed.
    pub fn op(&self) -> &'static str {
        match self {
            TerminalError::Io { op, .. }
            | TerminalError::NotOpen { op }
            | TerminalError::OutOfRange { op, .. } => op,
            TerminalError::Init { .. } | TerminalError::AlreadyOpen => "init",
            TerminalError::ReservedPair => "init_pair",
        }
    }

    pub(crate) fn io(op: &'static str) -> impl FnOnce(io::Error) -> TerminalError {
        move |source| TerminalError::Io { op, source }
    }
}

pub type Result<T> = std::result::Result<T, TerminalError>;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes tests that take the process-wide session lock.
#[cfg(test)]
pub(crate) fn lock_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

/// Process-wide guard ensuring one live session.
#[derive(Debug)]
struct SessionLock;

impl SessionLock {
    fn acquire() -> Result<Self> {
        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TerminalError::AlreadyOpen);
        }
        Ok(Self)
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Options applied when the session opens.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Use colors when the terminal supports them
    pub color: bool,
    /// Switch to the alternate screen buffer
    pub alternate_screen: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            color: true,
            alternate_screen: true,
        }
    }
}

/// State shared with the screen and input reader built on this session.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) active: AtomicBool,
    pub(crate) color: bool,
    pub(crate) resize: ResizeFlag,
}

impl Shared {
    pub(crate) fn new(color: bool) -> Self {
        Self {
            active: AtomicBool::new(true),
            color,
            resize: ResizeFlag::new(),
        }
    }

    pub(crate) fn ensure_active(&self, op: &'static str) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TerminalError::NotOpen { op })
        }
    }
}

/// Which setup steps completed, so teardown only undoes those.
#[derive(Debug, Default)]
struct Steps {
    raw: bool,
    screen: bool,
}

/// The terminal in raw UI mode.
#[derive(Debug)]
pub struct Session {
    shared: Arc<Shared>,
    steps: Steps,
    notifier: Option<ResizeNotifier>,
    lock: Option<SessionLock>,
}

impl Session {
    /// Session holding the lock but with no terminal steps applied, as
    /// left behind by an `open` that failed before raw mode.
    #[cfg(test)]
    pub(crate) fn detached() -> Result<Self> {
        Ok(Session {
            shared: Arc::new(Shared::new(false)),
            steps: Steps::default(),
            notifier: None,
            lock: Some(SessionLock::acquire()?),
        })
    }

    /// Enter raw mode on the controlling terminal.
    pub fn open(options: SessionOptions) -> Result<Self> {
        let lock = SessionLock::acquire()?;
        check_terminal(
            io::stdin().is_terminal(),
            io::stdout().is_terminal(),
            std::env::var("TERM").ok().as_deref(),
        )?;

        let color = options.color && probe_color();
        let mut session = Session {
            shared: Arc::new(Shared::new(color)),
            steps: Steps::default(),
            notifier: None,
            lock: Some(lock),
        };

        // On failure the partially opened session drops, which tears down
        // the completed steps and releases the lock.
        session.setup(&options)?;
        info!("terminal session open (color: {})", color);
        Ok(session)
    }

    fn setup(&mut self, options: &SessionOptions) -> Result<()> {
        terminal::enable_raw_mode().map_err(TerminalError::io("raw"))?;
        self.steps.raw = true;

        if options.alternate_screen {
            let mut stdout = io::stdout();
            execute!(stdout, EnterAlternateScreen).map_err(TerminalError::io("screen"))?;
            self.steps.screen = true;
        }
        execute!(io::stdout(), DisableLineWrap).map_err(TerminalError::io("screen"))?;

        let notifier =
            ResizeNotifier::install(&self.shared.resize).map_err(TerminalError::io("signal"))?;
        self.notifier = Some(notifier);
        Ok(())
    }

    /// Whether colors are in use for this session.
    pub fn has_color(&self) -> bool {
        self.shared.color
    }

    pub fn is_open(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Flag marked whenever the terminal is resized.
    pub fn resize_flag(&self) -> &ResizeFlag {
        &self.shared.resize
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Restore the terminal. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.lock.is_none() {
            return Ok(());
        }
        self.shared.active.store(false, Ordering::SeqCst);

        if let Some(mut notifier) = self.notifier.take() {
            notifier.uninstall();
        }

        let mut first_err: Option<io::Error> = None;
        let mut note = |r: io::Result<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        let mut stdout = io::stdout();
        if self.steps.raw {
            note(execute!(stdout, ResetColor, SetAttribute(Attribute::Reset)));
            note(execute!(stdout, Show));
            note(execute!(stdout, EnableLineWrap));
        }
        if std::mem::take(&mut self.steps.screen) {
            note(execute!(stdout, LeaveAlternateScreen));
        }
        note(stdout.flush());
        // Raw mode goes last so the escape sequences above are not echoed.
        if std::mem::take(&mut self.steps.raw) {
            note(terminal::disable_raw_mode());
        }

        self.lock = None;
        debug!("terminal session closed");

        match first_err {
            Some(source) => Err(TerminalError::Io { op: "close", source }),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("terminal restore incomplete: {}", e);
        }
    }
}

/// Reject non-interactive or unknown terminals.
fn check_terminal(stdin_tty: bool, stdout_tty: bool, term: Option<&str>) -> Result<()> {
    if !stdin_tty || !stdout_tty {
        return Err(TerminalError::Init {
            reason: "standard input and output must be a terminal".to_string(),
        });
    }
    if cfg!(unix) {
        match term {
            None | Some("") => {
                return Err(TerminalError::Init {
                    reason: "TERM is not set".to_string(),
                })
            }
            Some("dumb") => {
                return Err(TerminalError::Init {
                    reason: "terminal type 'dumb' cannot be driven".to_string(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn probe_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        return false;
    }
    crossterm::style::available_color_count() >= 8
}

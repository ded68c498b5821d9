//! Terminal control surface.
//!
//! - **session**: raw mode lifecycle and the one-live-session guard
//! - **screen**: geometry, cursor control and styled line writes
//! - **attr**: attribute bits, colors and color pairs
//! - **input**: blocking key reader with explicit retry
//! - **resize**: SIGWINCH driven geometry invalidation
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── ResizeNotifier (SIGWINCH -> ResizeFlag)
//! ├── Screen (Console + ColorPairs, re-probes size when flagged)
//! └── InputReader (KeySource -> Key)
//! ```

pub mod attr;
pub mod input;
pub mod resize;
pub mod screen;
pub mod session;

pub use attr::{Attr, Color, ColorPairs};
pub use input::{InputReader, Key, KeySource, ReadOutcome};
pub use resize::ResizeFlag;
pub use screen::{Console, CursorVisibility, Geometry, Screen, TtyConsole};
pub use session::{Session, SessionOptions, TerminalError};

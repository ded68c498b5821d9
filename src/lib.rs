//! playdeck - terminal and decoder-link core for a terminal audio player
//!
//! The crate owns two things a terminal player front-end needs and that
//! are hard to get right:
//!
//! - **term**: the terminal control surface. Raw mode lifecycle, screen
//!   geometry with SIGWINCH invalidation, styled writes with color pairs,
//!   and a blocking key reader.
//! - **decoder**: the line protocol to an external decoder process
//!   (mpg123 style remote mode). Packets are capped at 1024 bytes and
//!   redundant frames are filtered before they reach the caller.
//!
//! [`link::Link`] puts both behind one handle and merges keyboard and
//! decoder events into a single queue.
//!
//! # Architecture
//!
//! ```text
//! Link
//! ├── Session ── Screen, InputReader (input thread)
//! └── DecoderProcess ── PacketReader (decoder thread), CommandWriter
//! ```

pub mod config;
pub mod decoder;
pub mod link;
pub mod term;

pub use config::Config;
pub use decoder::{ChannelError, DecoderChannel, DecoderProcess, Packet};
pub use link::{Link, LinkEvent};
pub use term::{Attr, Color, Geometry, InputReader, Key, Screen, Session, TerminalError};

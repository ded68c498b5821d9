//! Link to the external decoder process.
//!
//! - **channel**: packet framing on the decoder's stdout, commands on its stdin
//! - **process**: spawning and stopping the decoder
//! - **paths**: program lookup and file status helpers

pub mod channel;
pub mod paths;
pub mod process;

pub use channel::{
    ChannelError, CommandWriter, DecoderChannel, Packet, PacketReader, MAX_PACKET_LEN,
};
pub use paths::FileKind;
pub use process::{DecoderError, DecoderProcess, ProcessChannel};

//! Framed pipe to the decoder process
//!
//! Status packets are newline-terminated lines of at most
//! [`MAX_PACKET_LEN`] payload bytes. Lines starting with the redundant-frame
//! prefix are dropped while reading and never reach the caller.

use std::io::{self, BufRead, ErrorKind, Write};

use thiserror::Error;
use tracing::{debug, trace};

/// Maximum payload bytes of one packet.
pub const MAX_PACKET_LEN: usize = 1024;

/// Line buffer size, payload plus terminator.
pub const PACKET_BUF_LEN: usize = MAX_PACKET_LEN + 1;

/// Default prefix of redundant continuation frames.
pub const DEFAULT_REDUNDANT_PREFIX: &str = "@@";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("decoder stream closed during {op}")]
    Closed { op: &'static str },

    #[error("decoder {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("command contains a newline")]
    EmbeddedNewline,
}

impl ChannelError {
    pub fn op(&self) -> &'static str {
        match self {
            ChannelError::Closed { op } | ChannelError::Io { op, .. } => op,
            ChannelError::EmbeddedNewline => "write",
        }
    }

    /// Whether the other end went away, as opposed to a transient fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// One status line from the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    line: String,
    truncated: bool,
}

impl Packet {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn into_string(self) -> String {
        self.line
    }

    /// Whether bytes past the cap were discarded.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// First whitespace-separated word, e.g. the `@P` of `@P 1`.
    pub fn tag(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or("")
    }

    /// Text after the tag.
    pub fn body(&self) -> &str {
        let trimmed = self.line.trim_start();
        match trimmed.find(char::is_whitespace) {
            Some(idx) => trimmed[idx..].trim_start(),
            None => "",
        }
    }
}

/// Reading half: status packets from the decoder's output.
pub struct PacketReader<R> {
    inner: R,
    redundant_prefix: Vec<u8>,
    buf: Vec<u8>,
    dropped: u64,
}

impl<R: BufRead> PacketReader<R> {
    pub fn new(inner: R, redundant_prefix: &str) -> Self {
        Self {
            inner,
            redundant_prefix: redundant_prefix.as_bytes().to_vec(),
            buf: Vec::with_capacity(PACKET_BUF_LEN),
            dropped: 0,
        }
    }

    /// Read the next packet, skipping redundant frames.
    pub fn read_packet(&mut self) -> Result<Packet> {
        let truncated = self.read_frame()?;
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        trace!("decoder packet: {}", line);
        Ok(Packet { line, truncated })
    }

    /// Number of redundant frames dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Fill `self.buf` with the next non-redundant line.
    fn read_frame(&mut self) -> Result<bool> {
        loop {
            let truncated = self.read_line_capped()?;
            if !self.redundant_prefix.is_empty() && self.buf.starts_with(&self.redundant_prefix) {
                self.dropped += 1;
                continue;
            }
            return Ok(truncated);
        }
    }

    /// Read one line into `self.buf`, keeping at most `MAX_PACKET_LEN`
    /// payload bytes and discarding the rest of the line.
    fn read_line_capped(&mut self) -> Result<bool> {
        self.buf.clear();
        let mut truncated = false;
        let mut saw_any = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(ChannelError::Io { op: "read", source }),
            };
            if available.is_empty() {
                if !saw_any {
                    return Err(ChannelError::Closed { op: "read" });
                }
                // Final line without a terminator.
                break;
            }
            saw_any = true;

            let (chunk, consumed, done) = match available.iter().position(|&b| b == b'\n') {
                Some(idx) => (&available[..idx], idx + 1, true),
                None => (available, available.len(), false),
            };
            let room = MAX_PACKET_LEN - self.buf.len();
            if chunk.len() > room {
                truncated = true;
            }
            self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            self.inner.consume(consumed);
            if done {
                break;
            }
        }

        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        if truncated {
            debug!("decoder line exceeded {} bytes, truncated", MAX_PACKET_LEN);
        }
        Ok(truncated)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writing half: commands to the decoder's input.
pub struct CommandWriter<W> {
    inner: W,
}

impl<W: Write> CommandWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Send `text` followed by a newline and flush it.
    pub fn send_command(&mut self, text: &str) -> Result<()> {
        if text.contains('\n') {
            return Err(ChannelError::EmbeddedNewline);
        }
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');

        self.inner
            .write_all(&line)
            .and_then(|_| self.inner.flush())
            .map_err(write_error)?;
        debug!("decoder command: {}", text);
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn write_error(source: io::Error) -> ChannelError {
    if source.kind() == ErrorKind::BrokenPipe {
        ChannelError::Closed { op: "write" }
    } else {
        ChannelError::Io { op: "write", source }
    }
}

/// Both halves of the pipe to a decoder.
pub struct DecoderChannel<R, W> {
    reader: PacketReader<R>,
    writer: CommandWriter<W>,
}

impl<R: BufRead, W: Write> DecoderChannel<R, W> {
    pub fn new(output: R, input: W, redundant_prefix: &str) -> Self {
        Self {
            reader: PacketReader::new(output, redundant_prefix),
            writer: CommandWriter::new(input),
        }
    }

    pub fn read_packet(&mut self) -> Result<Packet> {
        self.reader.read_packet()
    }

    pub fn send_command(&mut self, text: &str) -> Result<()> {
        self.writer.send_command(text)
    }

    /// Separate the halves so reads and writes can run on different threads.
    pub fn split(self) -> (PacketReader<R>, CommandWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    fn reader(data: &str) -> PacketReader<Cursor<Vec<u8>>> {
        PacketReader::new(Cursor::new(data.as_bytes().to_vec()), DEFAULT_REDUNDANT_PREFIX)
    }

    fn read_all<R: BufRead>(reader: &mut PacketReader<R>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match reader.read_packet() {
                Ok(packet) => lines.push(packet.into_string()),
                Err(ChannelError::Closed { .. }) => return lines,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn test_redundant_frames_are_dropped() {
        let mut reader = reader("@R MPG123\n@@ 1 2\n@F 1 2 0.1 9.9\n@@ 3\n@@ 4\n@P 0\n");
        assert_eq!(
            read_all(&mut reader),
            vec!["@R MPG123", "@F 1 2 0.1 9.9", "@P 0"]
        );
        assert_eq!(reader.dropped(), 3);
    }

    #[test]
    fn test_interleaved_frames_keep_order() {
        let mut data = String::new();
        let mut expected = Vec::new();
        for i in 0..50 {
            if i % 3 == 0 {
                data.push_str(&format!("@@ dup {}\n", i));
            } else {
                data.push_str(&format!("@F {}\n", i));
                expected.push(format!("@F {}", i));
            }
        }
        let mut reader = reader(&data);
        assert_eq!(read_all(&mut reader), expected);
        assert_eq!(reader.dropped(), 17);
    }

    #[test]
    fn test_long_line_is_truncated() {
        let long = "x".repeat(3000);
        let data = format!("{}\n@P 1\n", long);
        // Small internal buffer so the line spans many fills.
        let mut reader = PacketReader::new(BufReader::with_capacity(64, data.as_bytes()), "@@");

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.as_str().len(), MAX_PACKET_LEN);
        assert!(packet.was_truncated());

        let next = reader.read_packet().unwrap();
        assert_eq!(next.as_str(), "@P 1");
        assert!(!next.was_truncated());
    }

    #[test]
    fn test_exact_cap_is_not_truncated() {
        let line = "y".repeat(MAX_PACKET_LEN);
        let mut reader = reader(&format!("{}\n", line));
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.as_str(), line);
        assert!(!packet.was_truncated());
    }

    #[test]
    fn test_eof_is_distinct() {
        let mut reader = reader("@P 2\n");
        reader.read_packet().unwrap();
        let err = reader.read_packet().unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.op(), "read");
    }

    #[test]
    fn test_unterminated_last_line_and_crlf() {
        let mut reader = reader("@S 1.0\r\n@E done");
        assert_eq!(read_all(&mut reader), vec!["@S 1.0", "@E done"]);
    }

    #[test]
    fn test_empty_prefix_keeps_everything() {
        let mut reader = PacketReader::new(Cursor::new(b"@@ a\n".to_vec()), "");
        assert_eq!(reader.read_packet().unwrap().as_str(), "@@ a");
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_read_error_is_io() {
        let mut reader = PacketReader::new(BufReader::new(FailingReader), "@@");
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, ChannelError::Io { op: "read", .. }));
        assert!(!err.is_closed());
    }

    #[test]
    fn test_packet_tag_and_body() {
        let packet = Packet::new("@I ID3:Song  Artist");
        assert_eq!(packet.tag(), "@I");
        assert_eq!(packet.body(), "ID3:Song  Artist");
        assert_eq!(Packet::new("@R").body(), "");
    }

    /// Writer recording bytes and whether they were flushed.
    #[derive(Default)]
    struct RecordingWriter {
        pending: Vec<u8>,
        flushed: Vec<u8>,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushed.append(&mut self.pending);
            Ok(())
        }
    }

    #[test]
    fn test_send_command_writes_line_and_flushes() {
        let mut writer = CommandWriter::new(RecordingWriter::default());
        writer.send_command("PAUSE").unwrap();
        assert_eq!(writer.get_ref().flushed, b"PAUSE\n");
        assert!(writer.get_ref().pending.is_empty());
    }

    #[test]
    fn test_send_command_rejects_newline() {
        let mut writer = CommandWriter::new(RecordingWriter::default());
        let err = writer.send_command("LOAD a\nQUIT").unwrap_err();
        assert!(matches!(err, ChannelError::EmbeddedNewline));
        assert!(writer.get_ref().flushed.is_empty());
    }

    struct BrokenWriter(ErrorKind);

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "nope"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures() {
        let mut writer = CommandWriter::new(BrokenWriter(ErrorKind::BrokenPipe));
        assert!(writer.send_command("STOP").unwrap_err().is_closed());

        let mut writer = CommandWriter::new(BrokenWriter(ErrorKind::Other));
        let err = writer.send_command("STOP").unwrap_err();
        assert!(matches!(err, ChannelError::Io { op: "write", .. }));
    }

    #[test]
    fn test_channel_round_trip() {
        let mut channel = DecoderChannel::new(
            Cursor::new(b"@R MPG123 (ThOr) v10\n".to_vec()),
            RecordingWriter::default(),
            "@@",
        );
        channel.send_command("SILENCE").unwrap();
        assert_eq!(channel.read_packet().unwrap().tag(), "@R");
        let (_, writer) = channel.split();
        assert_eq!(writer.into_inner().flushed, b"SILENCE\n");
    }
}

//! Terminal + decoder link
//!
//! Owns the terminal session, the screen, and the decoder pipes. Keyboard
//! input and decoder packets arrive on two reader threads and are merged
//! into one event queue for the application's control loop.

use std::io::BufRead;
use std::process::ChildStdin;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::decoder::{
    ChannelError, CommandWriter, DecoderProcess, Packet, PacketReader, ProcessChannel,
};
use crate::term::{Console, InputReader, Key, KeySource, Screen, Session, TerminalError};

/// Events delivered to the control loop
#[derive(Debug)]
pub enum LinkEvent {
    /// A key was pressed
    Key(Key),
    /// Status line from the decoder
    Packet(Packet),
    /// Decoder output reached end of stream
    DecoderClosed,
    /// Reading from the decoder failed
    DecoderLost(ChannelError),
    /// Keyboard input failed
    InputFailed(TerminalError),
}

/// Run `reader` on its own thread, forwarding keys until the session closes.
pub fn spawn_input_thread<S>(mut reader: InputReader<S>, tx: Sender<LinkEvent>) -> JoinHandle<()>
where
    S: KeySource + Send + 'static,
{
    thread::spawn(move || loop {
        match reader.next_key() {
            Ok(key) => {
                if tx.send(LinkEvent::Key(key)).is_err() {
                    break;
                }
            }
            Err(TerminalError::NotOpen { .. }) => {
                debug!("input thread stopping, session closed");
                break;
            }
            Err(e) => {
                error!("input failed: {}", e);
                let _ = tx.send(LinkEvent::InputFailed(e));
                break;
            }
        }
    })
}

/// Run `reader` on its own thread, forwarding packets until the stream ends.
pub fn spawn_decoder_thread<R>(mut reader: PacketReader<R>, tx: Sender<LinkEvent>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || loop {
        match reader.read_packet() {
            Ok(packet) => {
                if tx.send(LinkEvent::Packet(packet)).is_err() {
                    break;
                }
            }
            Err(ChannelError::Closed { .. }) => {
                info!(
                    "decoder output closed ({} redundant frames dropped)",
                    reader.dropped()
                );
                let _ = tx.send(LinkEvent::DecoderClosed);
                break;
            }
            Err(e) => {
                warn!("decoder link lost: {}", e);
                let _ = tx.send(LinkEvent::DecoderLost(e));
                break;
            }
        }
    })
}

/// The terminal session and decoder link as one unit.
pub struct Link {
    screen: Screen,
    commands: CommandWriter<ChildStdin>,
    events: Receiver<LinkEvent>,
    decoder: Option<DecoderProcess>,
    input_thread: Option<JoinHandle<()>>,
    decoder_thread: Option<JoinHandle<()>>,
    session: Session,
}

impl Link {
    /// Start the input and decoder reader threads.
    pub fn start(
        session: Session,
        screen: Screen,
        decoder: DecoderProcess,
        channel: ProcessChannel,
    ) -> Self {
        let (tx, events) = mpsc::channel();
        let (packets, commands) = channel.split();

        let input_thread = spawn_input_thread(InputReader::new(&session), tx.clone());
        let decoder_thread = spawn_decoder_thread(packets, tx);

        Self {
            screen,
            commands,
            events,
            decoder: Some(decoder),
            input_thread: Some(input_thread),
            decoder_thread: Some(decoder_thread),
            session,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LinkEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // Both readers are gone; avoid spinning the caller.
                thread::sleep(timeout);
                None
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<LinkEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn send_command(&mut self, text: &str) -> Result<(), ChannelError> {
        self.commands.send_command(text)
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the decoder process is still running.
    pub fn decoder_running(&mut self) -> bool {
        match self.decoder.as_mut().map(|d| d.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    /// Stop the decoder, restore the terminal and join the reader threads.
    pub fn shutdown(mut self) -> Result<(), TerminalError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), TerminalError> {
        let closed = restore_terminal(&mut self.screen, &mut self.session);

        if let Some(mut decoder) = self.decoder.take() {
            if let Err(e) = decoder.kill() {
                warn!("failed to stop decoder: {}", e);
            }
        }
        for handle in [self.input_thread.take(), self.decoder_thread.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                error!("reader thread panicked");
            }
        }
        closed
    }
}

/// Flush queued screen output while the UI modes are still active, then
/// restore the terminal.
fn restore_terminal<C: Console>(
    screen: &mut Screen<C>,
    session: &mut Session,
) -> Result<(), TerminalError> {
    if let Err(e) = screen.flush_pending() {
        warn!("failed to flush screen before restore: {}", e);
    }
    session.close()
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("link shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::screen::tests::MemoryConsole;
    use crate::term::session::{lock_guard, Shared};
    use crate::term::{Attr, ReadOutcome};
    use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
    use std::collections::VecDeque;
    use std::io::{self, Cursor};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct QueueKeys {
        events: VecDeque<ReadOutcome>,
        shared: Arc<Shared>,
    }

    impl KeySource for QueueKeys {
        fn wait_readable(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn try_read(&mut self) -> io::Result<ReadOutcome> {
            match self.events.pop_front() {
                Some(outcome) => Ok(outcome),
                None => {
                    // Out of input: behave like a session being closed.
                    self.shared.active.store(false, Ordering::SeqCst);
                    Ok(ReadOutcome::WouldBlock)
                }
            }
        }
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_input_thread_forwards_keys_then_stops() {
        let shared = Arc::new(Shared::new(false));
        let source = QueueKeys {
            events: VecDeque::from(vec![
                ReadOutcome::WouldBlock,
                ReadOutcome::Ready(key(KeyCode::Char('p'))),
                ReadOutcome::Ready(key(KeyCode::Right)),
            ]),
            shared: Arc::clone(&shared),
        };
        let (tx, rx) = mpsc::channel();
        let handle = spawn_input_thread(InputReader::from_shared(shared, source), tx);
        handle.join().unwrap();

        let keys: Vec<Key> = rx
            .try_iter()
            .map(|event| match event {
                LinkEvent::Key(key) => key,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(keys, vec![Key::Char('p'), Key::Right]);
    }

    #[test]
    fn test_decoder_thread_reports_close() {
        let reader = PacketReader::new(Cursor::new(b"@R MPG123\n@@ x\n@P 2\n".to_vec()), "@@");
        let (tx, rx) = mpsc::channel();
        spawn_decoder_thread(reader, tx).join().unwrap();

        let events: Vec<LinkEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], LinkEvent::Packet(p) if p.as_str() == "@R MPG123"));
        assert!(matches!(&events[1], LinkEvent::Packet(p) if p.as_str() == "@P 2"));
        assert!(matches!(events[2], LinkEvent::DecoderClosed));
    }

    struct BrokenPipe;

    impl io::Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "pipe fault"))
        }
    }

    #[test]
    fn test_decoder_thread_reports_fault() {
        let reader = PacketReader::new(io::BufReader::new(BrokenPipe), "@@");
        let (tx, rx) = mpsc::channel();
        spawn_decoder_thread(reader, tx).join().unwrap();

        match rx.try_recv() {
            Ok(LinkEvent::DecoderLost(e)) => assert_eq!(e.op(), "read"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_queued_output_flushed_before_restore() {
        let _guard = lock_guard();
        let mut session = Session::detached().unwrap();
        let mut screen = Screen::with_console(&session, MemoryConsole::new(5, 20));
        screen.write_text("stopping", 20, Attr::empty(), 0).unwrap();
        assert_eq!(screen.console().flushes, 0);

        restore_terminal(&mut screen, &mut session).unwrap();
        assert_eq!(screen.console().flushes, 1);
        assert!(screen.console().text().ends_with("stopping"));
        assert!(!session.is_open());
    }
}

//! Decoder subprocess
//!
//! Spawns the external decoder with piped standard input and output and
//! hands back a [`DecoderChannel`] on those pipes.

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::channel::DecoderChannel;
use super::paths;
use crate::config::DecoderConfig;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("decoder program '{program}' not found")]
    NotFound { program: String },

    #[error("failed to spawn decoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("decoder was spawned without a {0} pipe")]
    MissingPipe(&'static str),
}

pub type Result<T> = std::result::Result<T, DecoderError>;

/// Channel type on a spawned decoder's pipes.
pub type ProcessChannel = DecoderChannel<BufReader<ChildStdout>, ChildStdin>;

/// Handle to the running decoder. Dropping it kills and reaps the process.
pub struct DecoderProcess {
    child: Child,
    program: PathBuf,
}

impl DecoderProcess {
    /// Start the decoder described by `config`.
    pub fn spawn(config: &DecoderConfig) -> Result<(Self, ProcessChannel)> {
        let program = paths::resolve_program(&config.program).ok_or_else(|| {
            DecoderError::NotFound {
                program: config.program.clone(),
            }
        })?;

        let mut child = Command::new(&program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DecoderError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let mut process = DecoderProcess { child, program };
        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            (None, _) => return Err(DecoderError::MissingPipe("stdin")),
            (_, None) => return Err(DecoderError::MissingPipe("stdout")),
        };

        info!(
            "decoder started: {} (pid {})",
            process.program.display(),
            process.id()
        );
        let channel = DecoderChannel::new(
            BufReader::new(stdout),
            stdin,
            &config.redundant_prefix,
        );
        // Early exit shows up as a closed stream on the first read.
        if let Ok(Some(status)) = process.try_wait() {
            warn!("decoder exited immediately: {}", status);
        }
        Ok((process, channel))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Exit status if the decoder has exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Kill the decoder and wait for it.
    pub fn kill(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }
        match self.child.kill() {
            Ok(()) => {}
            // Already exited between try_wait and kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        let status = self.child.wait()?;
        debug!("decoder stopped: {}", status);
        Ok(status)
    }

    /// Wait for the decoder to exit on its own.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!("failed to stop decoder: {}", e);
        }
    }
}

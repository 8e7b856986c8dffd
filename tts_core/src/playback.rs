//! Playback through one long-lived external player process.
//!
//! The player reads a continuous encoded audio stream on stdin and exits once
//! stdin is closed and everything has been played.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::error::PlaybackError;
use crate::synth::AudioChunk;

/// Program and arguments used to launch the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PlayerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parse a whitespace separated command line. `None` if it is blank.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Result of handing a chunk to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// No open session; the chunk was dropped. Expected after end or stop.
    Skipped,
}

/// Where the relay sends synthesized audio.
#[async_trait]
pub trait AudioSink: Send {
    /// Make sure a playback session is running. Idempotent.
    async fn ensure_started(&mut self) -> Result<(), PlaybackError>;

    async fn write(&mut self, chunk: &AudioChunk) -> WriteOutcome;

    /// Signal end of audio, wait for playback to finish, clear the session.
    async fn end_gracefully(&mut self) -> Result<(), PlaybackError>;

    /// Tear the session down now. Never fails; a no-op without a session.
    async fn stop_immediately(&mut self);

    fn is_active(&self) -> bool;
}

struct PlaybackSession {
    child: Child,
    stdin: Option<ChildStdin>,
}

/// `AudioSink` backed by a player process.
pub struct PlaybackSink {
    command: PlayerCommand,
    session: Option<PlaybackSession>,
    bytes_written: u64,
}

impl PlaybackSink {
    pub fn new(command: PlayerCommand) -> Self {
        Self {
            command,
            session: None,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[async_trait]
impl AudioSink for PlaybackSink {
    async fn ensure_started(&mut self) -> Result<(), PlaybackError> {
        if self.session.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlaybackError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;
        let stdin = child.stdin.take();
        info!(program = %self.command.program, pid = ?child.id(), "Player started");

        self.session = Some(PlaybackSession { child, stdin });
        Ok(())
    }

    async fn write(&mut self, chunk: &AudioChunk) -> WriteOutcome {
        let Some(stdin) = self.session.as_mut().and_then(|s| s.stdin.as_mut()) else {
            debug!(sequence = chunk.sequence, "No open player input, dropping audio chunk");
            return WriteOutcome::Skipped;
        };

        match stdin.write_all(&chunk.bytes).await {
            Ok(()) => {
                self.bytes_written += chunk.bytes.len() as u64;
                WriteOutcome::Written
            }
            Err(e) => {
                warn!(sequence = chunk.sequence, "Player input closed unexpectedly: {e}");
                if let Some(session) = self.session.as_mut() {
                    session.stdin = None;
                }
                WriteOutcome::Skipped
            }
        }
    }

    async fn end_gracefully(&mut self) -> Result<(), PlaybackError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        if let Some(mut stdin) = session.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!("Closing player input failed: {e}");
            }
        }
        // The session stays in place until the player has exited so that a
        // cancelled wait can still be finished off by `stop_immediately`.
        let exited = session.child.wait().await;
        self.session = None;
        let status = exited.map_err(PlaybackError::Wait)?;
        info!(%status, bytes = self.bytes_written, "Player finished");
        Ok(())
    }

    async fn stop_immediately(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        drop(session.stdin.take());
        if let Err(e) = session.child.start_kill() {
            debug!("Player already gone: {e}");
        }
        match session.child.wait().await {
            Ok(status) => info!(%status, "Player stopped"),
            Err(e) => debug!("Waiting for stopped player failed: {e}"),
        }
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

//! Test doubles shared by the relay integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tts_core::{
    AudioChunk, AudioSink, AudioStream, PlaybackError, SynthesisError, Synthesizer, WriteOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Started,
    Write { sequence: u64, bytes: Vec<u8> },
    Ended,
    Stopped,
}

pub type SinkLog = Arc<Mutex<Vec<SinkEvent>>>;

/// Sink that records every call instead of playing anything.
pub struct RecordingSink {
    log: SinkLog,
    active: bool,
    fail_start: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, SinkLog) {
        let log = SinkLog::default();
        let sink = Self {
            log: log.clone(),
            active: false,
            fail_start: false,
        };
        (sink, log)
    }

    /// A sink whose player can never be launched.
    pub fn broken() -> (Self, SinkLog) {
        let (mut sink, log) = Self::new();
        sink.fail_start = true;
        (sink, log)
    }

    fn record(&self, event: SinkEvent) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn ensure_started(&mut self) -> Result<(), PlaybackError> {
        if self.fail_start {
            return Err(PlaybackError::Spawn {
                program: "missing-player".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        if !self.active {
            self.active = true;
            self.record(SinkEvent::Started);
        }
        Ok(())
    }

    async fn write(&mut self, chunk: &AudioChunk) -> WriteOutcome {
        if !self.active {
            return WriteOutcome::Skipped;
        }
        self.record(SinkEvent::Write {
            sequence: chunk.sequence,
            bytes: chunk.bytes.to_vec(),
        });
        WriteOutcome::Written
    }

    async fn end_gracefully(&mut self) -> Result<(), PlaybackError> {
        if self.active {
            self.active = false;
            self.record(SinkEvent::Ended);
        }
        Ok(())
    }

    async fn stop_immediately(&mut self) {
        if self.active {
            self.active = false;
            self.record(SinkEvent::Stopped);
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Sequence numbers of every recorded write, in write order.
pub fn written_sequences(log: &SinkLog) -> Vec<u64> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SinkEvent::Write { sequence, .. } => Some(*sequence),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Time before the response "arrives".
    pub delay: Duration,
    pub chunks: Vec<&'static [u8]>,
    pub fail_status: Option<u16>,
    /// Respond, then never deliver a byte.
    pub hang: bool,
    /// Deliver `chunks`, then keep the stream open forever.
    pub stall_after_chunks: bool,
}

/// Synthesizer that plays back canned responses per input text.
#[derive(Default)]
pub struct ScriptedSynth {
    scripts: HashMap<String, Script>,
    calls: Arc<Mutex<Vec<String>>>,
    started: Option<mpsc::UnboundedSender<String>>,
}

impl ScriptedSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, text: &str, script: Script) -> Self {
        self.scripts.insert(text.to_string(), script);
        self
    }

    /// Report each synthesize call on the returned channel.
    pub fn notify_calls(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.started = Some(tx);
        rx
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynth {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SynthesisError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(tx) = &self.started {
            let _ = tx.send(text.to_string());
        }

        let script = self.scripts.get(text).cloned().unwrap_or_else(|| Script {
            chunks: vec![b"audio"],
            ..Script::default()
        });
        if let Some(status) = script.fail_status {
            return Err(SynthesisError::Status {
                status,
                body: "synthesis backend unavailable".into(),
            });
        }
        tokio::time::sleep(script.delay).await;
        if script.hang {
            return Ok(Box::pin(stream::pending()));
        }

        let chunks: Vec<Result<Bytes, SynthesisError>> = script
            .chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        if script.stall_after_chunks {
            return Ok(Box::pin(stream::iter(chunks).chain(stream::pending())));
        }
        Ok(Box::pin(stream::iter(chunks)))
    }
}

pub fn unit(content: &str, sequence: u64) -> tts_core::TextUnit {
    tts_core::TextUnit {
        content: content.to_string(),
        sequence,
    }
}

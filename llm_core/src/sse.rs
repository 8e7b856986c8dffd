//! Server-sent event framing.
//!
//! `SseCodec` is a `tokio_util` decoder that cuts a byte buffer into the
//! `data` payloads of complete events. `SseDecoder` drives it for callers
//! that receive arbitrarily split chunks. Neither knows what the payloads
//! mean; both the upstream chat-completions stream and the UI message stream
//! go through them.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::DecodeError;

/// Largest event kept in memory (1 MB). Bigger events are dropped.
pub const DEFAULT_MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Codec for `text/event-stream` bodies. Every byte is scanned once: the
/// scan position and line state survive between calls.
#[derive(Debug, Clone)]
pub struct SseCodec {
    max_event_size: usize,
    // Bytes at the front of the buffer already scanned for a blank line.
    scanned: usize,
    at_line_start: bool,
    // Last byte scanned was '\r'; a following '\n' belongs to the same break.
    after_cr: bool,
    // The current event overflowed and is being skipped.
    discarding: bool,
}

impl SseCodec {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_EVENT_SIZE)
    }

    pub fn with_max_size(max_event_size: usize) -> Self {
        Self {
            max_event_size,
            scanned: 0,
            at_line_start: true,
            after_cr: false,
            discarding: false,
        }
    }

    pub fn max_event_size(&self) -> usize {
        self.max_event_size
    }

    /// Scan the unscanned part of `src`. Returns the length of the first
    /// complete event, separator included.
    fn scan(&mut self, src: &[u8]) -> Option<usize> {
        for (offset, &b) in src[self.scanned..].iter().enumerate() {
            let i = self.scanned + offset;
            if self.after_cr {
                self.after_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\r' | b'\n' => {
                    self.after_cr = b == b'\r';
                    if self.at_line_start {
                        self.scanned = 0;
                        return Some(i + 1);
                    }
                    self.at_line_start = true;
                }
                _ => self.at_line_start = false,
            }
        }
        self.scanned = src.len();
        None
    }
}

impl Default for SseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SseCodec {
    type Item = String;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(len) = self.scan(&src[..]) {
            let block = src.split_to(len);
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(data) = parse_block(&block)? {
                return Ok(Some(data));
            }
        }

        if src.len() > self.max_event_size {
            if !self.discarding {
                warn!(
                    "Dropping SSE event larger than {} bytes",
                    self.max_event_size
                );
            }
            // Line state is kept in the codec, so the bytes themselves can go.
            src.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        Ok(None)
    }

    /// An event cut off by the end of the stream is still delivered.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(data) = self.decode(src)? {
            return Ok(Some(data));
        }
        let tail = src.split();
        let discarded = std::mem::take(&mut self.discarding);
        self.scanned = 0;
        self.at_line_start = true;
        self.after_cr = false;
        if tail.is_empty() || discarded {
            return Ok(None);
        }
        parse_block(&tail)
    }
}

/// Push-style driver around `SseCodec`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    codec: SseCodec,
    pending: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_event_size(max_event_size: usize) -> Self {
        Self {
            codec: SseCodec::with_max_size(max_event_size),
            pending: BytesMut::new(),
        }
    }

    /// Feed one chunk and return the payloads of every event it completed.
    ///
    /// Payloads that are not valid UTF-8 are logged and dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        loop {
            match self.codec.decode(&mut self.pending) {
                Ok(Some(data)) => payloads.push(data),
                Ok(None) => break,
                // The bad event has already been consumed.
                Err(e) => warn!("Dropping undecodable SSE event: {e}"),
            }
        }
        payloads
    }

    /// Flush an event that was not terminated by a blank line before the
    /// stream ended.
    pub fn finish(&mut self) -> Option<String> {
        match self.codec.decode_eof(&mut self.pending) {
            Ok(data) => data,
            Err(e) => {
                warn!("Dropping undecodable trailing SSE event: {e}");
                None
            }
        }
    }

    /// Bytes held back waiting for the rest of an event.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn parse_block(block: &[u8]) -> Result<Option<String>, DecodeError> {
    let text = std::str::from_utf8(block)?;

    let mut data: Option<String> = None;
    for line in text.split(['\n', '\r']) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            continue;
        }
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }
    Ok(data)
}

//! Typed events of the UI message stream.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::sse::SseDecoder;

/// Payload that terminates a stream regardless of any JSON around it.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded upstream event. Only text deltas and the two end markers
/// matter to the relay; everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta { text: String },
    Finish,
    Done,
    Other,
}

impl StreamEvent {
    /// True for the events that close a response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish | StreamEvent::Done)
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WirePayload {
    TextDelta { delta: String },
    Finish,
    #[serde(other)]
    Unknown,
}

/// Map one `data` payload to an event.
pub fn decode_payload(data: &str) -> Result<StreamEvent, DecodeError> {
    if data.contains(DONE_SENTINEL) {
        return Ok(StreamEvent::Done);
    }
    let event = match serde_json::from_str::<WirePayload>(data)? {
        WirePayload::TextDelta { delta } => StreamEvent::TextDelta { text: delta },
        WirePayload::Finish => StreamEvent::Finish,
        WirePayload::Unknown => StreamEvent::Other,
    };
    Ok(event)
}

/// Byte chunks in, `StreamEvent`s out.
#[derive(Debug, Default)]
pub struct EventDecoder {
    frames: SseDecoder,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.frames
            .push(chunk)
            .iter()
            .filter_map(|data| Self::decode_logged(data))
            .collect()
    }

    /// Decode whatever was left unterminated when the upstream closed.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.frames
            .finish()
            .and_then(|data| Self::decode_logged(&data))
    }

    fn decode_logged(data: &str) -> Option<StreamEvent> {
        match decode_payload(data) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping malformed stream event: {e}");
                debug!(payload = %data, "malformed payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_shapes() {
        assert_eq!(
            decode_payload(r#"{"type":"text-delta","id":"0","delta":"Hi"}"#).unwrap(),
            StreamEvent::TextDelta { text: "Hi".into() }
        );
        assert_eq!(decode_payload(r#"{"type":"finish"}"#).unwrap(), StreamEvent::Finish);
        assert_eq!(decode_payload(r#"{"type":"start"}"#).unwrap(), StreamEvent::Other);
        assert_eq!(decode_payload("[DONE]").unwrap(), StreamEvent::Done);
    }

    #[test]
    fn test_sentinel_wins_over_json_shape() {
        let event = decode_payload(r#"{"type":"text-delta","delta":"[DONE]"}"#).unwrap();
        assert_eq!(event, StreamEvent::Done);
    }

    #[test]
    fn test_malformed_event_does_not_abort_stream() {
        let mut dec = EventDecoder::new();
        let events = dec.push(
            b"data: {\"type\":\"text-delta\",\"delta\":\"a\"}\n\n\
              data: {not json\n\n\
              data: {\"type\":\"text-delta\"}\n\n\
              data: {\"type\":\"text-delta\",\"delta\":\"b\"}\n\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta { text: "a".into() },
                StreamEvent::TextDelta { text: "b".into() },
            ]
        );
    }

    #[test]
    fn test_trailing_event_flushed_on_finish() {
        let mut dec = EventDecoder::new();
        assert!(dec.push(b"data: [DONE]").is_empty());
        assert_eq!(dec.finish(), Some(StreamEvent::Done));
        assert_eq!(dec.finish(), None);
    }
}

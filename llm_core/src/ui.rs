//! Encoder for the UI message stream sent to the browser.

use bytes::Bytes;
use serde::Serialize;

use crate::event::DONE_SENTINEL;

/// Header the UI uses to recognise the stream protocol.
pub const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const UI_STREAM_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiChunk {
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
    Finish,
}

impl UiChunk {
    /// Serialize as one `data:` frame.
    pub fn to_frame(&self) -> Bytes {
        // Serializing this enum cannot fail: every field is a plain string.
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Bytes::from(format!("data: {json}\n\n"))
    }
}

pub fn done_frame() -> Bytes {
    Bytes::from(format!("data: {DONE_SENTINEL}\n\n"))
}

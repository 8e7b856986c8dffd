//! Language-model side of the chat pipeline: the streaming completions
//! client and the decoders for the event streams it produces and consumes.

pub mod client;
pub mod error;
pub mod event;
pub mod sse;
pub mod ui;

pub use client::{ChatMessage, LlmClient, LlmConfig, UiByteStream};
pub use error::{DecodeError, LlmError};
pub use event::{decode_payload, EventDecoder, StreamEvent, DONE_SENTINEL};
pub use sse::{SseCodec, SseDecoder, DEFAULT_MAX_EVENT_SIZE};
pub use ui::{done_frame, UiChunk, UI_STREAM_HEADER, UI_STREAM_VERSION};

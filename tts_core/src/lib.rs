//! Incremental text-to-speech relay.
//!
//! Sits between a streamed model response and an audio player: sentences are
//! cut out of the text as it arrives, synthesized one at a time, and written
//! in order into a single player process per response, while the original
//! byte stream goes through to its consumer untouched.

pub mod error;
pub mod playback;
pub mod relay;
pub mod segmenter;
pub mod synth;
pub mod tap;

pub use error::{PlaybackError, SegmentationError, SynthesisError};
pub use playback::{AudioSink, PlaybackSink, PlayerCommand, WriteOutcome};
pub use relay::{QueueItem, RelayCoordinator, RelayHandle, RelayState, RelaySummary};
pub use segmenter::{SentenceSegmenter, TextUnit};
pub use synth::{AudioChunk, AudioStream, SpeechClient, SpeechConfig, Synthesizer, VoiceSettings};
pub use tap::SpeechRelay;

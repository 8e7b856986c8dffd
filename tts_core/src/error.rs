use thiserror::Error;

/// Failure to turn one text unit into audio. Affects only that unit.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("speech request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("refusing to synthesize empty text")]
    EmptyText,
}

/// Errors from the external player process.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The player could not be launched. Fatal for the response's audio.
    #[error("failed to start player '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("player did not exit cleanly: {0}")]
    Wait(#[source] std::io::Error),
}

/// The segmenter's bookkeeping no longer adds up. Should be unreachable.
#[derive(Debug, Error)]
#[error("segmentation invariant violated: {consumed} consumed + {buffered} buffered != {transcript} transcript bytes")]
pub struct SegmentationError {
    pub consumed: usize,
    pub buffered: usize,
    pub transcript: usize,
}

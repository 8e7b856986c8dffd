use thiserror::Error;

/// A single upstream event that could not be understood.
///
/// Never fatal: the decoder logs it and moves on to the next event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reading event stream failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the upstream chat-completions client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("LLM configuration error: {0}")]
    Config(String),
}

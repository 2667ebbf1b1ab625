use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response had no usable content")]
    EmptyResponse,
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("failed to write {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Reasons a generated post is unfit to publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("content is empty")]
    Empty,
    #[error("content too short ({words} words)")]
    TooShort { words: usize },
    #[error("content too long for LinkedIn ({words} words)")]
    TooLong { words: usize },
    #[error("exceeds LinkedIn character limit ({chars} characters)")]
    TooManyChars { chars: usize },
}

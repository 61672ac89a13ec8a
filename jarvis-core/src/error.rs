use thiserror::Error;

/// All errors produced by jarvis-core.
#[derive(Debug, Error)]
pub enum JarvisError {
    #[error("malformed base64 payload: {0}")]
    MalformedEncoding(String),

    #[error("truncated PCM16 frame: {len} bytes is not a whole number of samples")]
    TruncatedFrame { len: usize },

    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("invalid wav data: {0}")]
    InvalidWav(String),

    #[error("audio segment contains no samples")]
    EmptySegment,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("live session is already running")]
    AlreadyRunning,

    #[error("live session is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JarvisError {
    /// Errors that only affect the chunk being decoded; the session carries on.
    pub fn is_chunk_local(&self) -> bool {
        matches!(
            self,
            JarvisError::MalformedEncoding(_)
                | JarvisError::TruncatedFrame { .. }
                | JarvisError::UnsupportedMimeType(_)
                | JarvisError::EmptySegment
        )
    }
}

pub type Result<T> = std::result::Result<T, JarvisError>;

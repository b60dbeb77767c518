pub type HistoryResult<T> = Result<T, HistoryError>;

/// Error type for the history engine and its file formats.
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("invalid mask dimensions {width}×{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid tile size {0}")]
    InvalidTileSize(u32),

    #[error("mask buffer has {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid stroke: {0}")]
    InvalidStroke(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl HistoryError {
    pub fn invalid_stroke(msg: impl Into<String>) -> Self {
        Self::InvalidStroke(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

impl From<Box<bincode::ErrorKind>> for HistoryError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        HistoryError::Serialize(e.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Serialize(e.to_string())
    }
}

impl From<image::ImageError> for HistoryError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => HistoryError::Io(io),
            other => HistoryError::Serialize(other.to_string()),
        }
    }
}

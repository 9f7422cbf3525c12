use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("hand observation has {found} landmarks, expected 21")]
    LandmarkCount { found: usize },

    #[error("failed to encode GPU buffer: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

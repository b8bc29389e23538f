use thiserror::Error;

/// Library error type for gallery operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A configured directory is missing or not a directory.
    #[error("invalid directory: {0}")]
    BadDir(String),

    /// An uploaded or renamed file was rejected.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The requested item does not exist (anymore).
    #[error("not found: {0}")]
    NotFound(String),

    /// The target name is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A settings update failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A shutdown or restart countdown is already running.
    #[error("a power action is already in progress")]
    PowerActionBusy,

    /// Cancel was requested but nothing is counting down.
    #[error("no power action in progress")]
    NoPowerAction,

    /// Caption metadata could not be encoded into the image.
    #[error("caption: {0}")]
    Caption(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}

use thiserror::Error;

pub type RegResult<T> = Result<T, RegError>;

#[derive(Debug, Error)]
pub enum RegError {
    /// Bad or missing startup configuration. Fatal: the daemon must not start.
    #[error("config error: {0}")]
    Config(String),

    /// Envelope string is not `ivHex:cipherHex`
    #[error("invalid envelope format: {0}")]
    Format(String),

    /// Wrong key, bad padding, or corrupted ciphertext
    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("student not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RegError {
    /// True for the failures a reader should treat as "this record cannot be
    /// opened" rather than "the request failed".
    pub fn is_decrypt_failure(&self) -> bool {
        matches!(
            self,
            RegError::Format(_) | RegError::Decrypt(_) | RegError::Serialization(_)
        )
    }
}

use thiserror::Error;

pub type KpvResult<T> = Result<T, KpvError>;

/// Error taxonomy for the protection core.
///
/// `Format` and `Integrity` are deliberately distinct: a malformed header is
/// a different failure from a hash/sequence mismatch, and callers (and tests)
/// need to tell tampering apart from garbage input. None of these are
/// retryable.
#[derive(Debug, Error)]
pub enum KpvError {
    #[error("format error: {0}")]
    Format(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("index {index} out of range (len {len})")]
    Range { index: usize, len: usize },

    #[error("crypto configuration error: {0}")]
    CryptoConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KpvError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, KpvError::Integrity(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, KpvError::Format(_))
    }
}

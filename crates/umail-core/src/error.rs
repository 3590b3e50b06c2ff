use std::path::PathBuf;

use thiserror::Error;

pub type UmailResult<T> = Result<T, UmailError>;

#[derive(Debug, Error)]
pub enum UmailError {
    #[error("key pool \"{pool}\" exhausted: {requested} bytes requested, {available} bytes remaining")]
    KeyExhausted {
        pool: String,
        requested: u64,
        available: u64,
    },

    #[error("corrupt key pool \"{pool}\": {reason}")]
    CorruptPool { pool: String, reason: String },

    #[error("key pool already exists: {}", path.display())]
    PoolExists { path: PathBuf },

    #[error("invalid offset {requested} for key pool \"{pool}\" ({len} key bytes)")]
    InvalidOffset { pool: String, requested: u64, len: u64 },

    /// Moving the cursor back would hand out already-used key bytes again.
    #[error(
        "refusing to rewind key pool \"{pool}\" from {from} to {to}: bytes {to}..{from} were already used"
    )]
    RewindRefused { pool: String, from: u64, to: u64 },

    #[error("payload too large: {len} bytes (maximum {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("truncated frame: length prefix declares {declared} bytes, {available} present")]
    TruncatedFrame { declared: usize, available: usize },

    /// Cipher precondition: both operands must be the same length.
    #[error("length mismatch: {left} bytes vs {right} bytes")]
    LengthMismatch { left: usize, right: usize },

    #[error("chunk count mismatch: {plaintext} plaintext chunks, {key} key chunks")]
    ChunkCountMismatch { plaintext: usize, key: usize },

    #[error("invalid count: {0}")]
    InvalidCount(String),

    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("session not found: \"{name}\"")]
    SessionNotFound { name: String },

    #[error("session already exists: \"{name}\"")]
    SessionExists { name: String },

    #[error("corrupt session \"{name}\": {reason}")]
    CorruptSession { name: String, reason: String },

    #[error("session \"{name}\" already complete ({total} boundaries sent)")]
    AlreadyComplete { name: String, total: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

}

impl UmailError {
    pub fn corrupt_pool(pool: &str, reason: impl Into<String>) -> Self {
        UmailError::CorruptPool {
            pool: pool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt_session(name: &str, reason: impl Into<String>) -> Self {
        UmailError::CorruptSession {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

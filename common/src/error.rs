use thiserror::Error;

/// Failures reported by a storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("key not found")]
    NotFound,
    #[error("stored blob needs {needed} bytes")]
    BufferTooSmall { needed: usize },
    #[error("backend initialization failed: {0}")]
    Init(String),
    #[error("failed to open namespace: {0}")]
    Open(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(err.to_string())
        }
    }
}

/// Why a read could not be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadFailure {
    #[error("entry not found")]
    NotFound,
    #[error("checksum record missing")]
    ChecksumMissing,
    #[error("checksum record has {len} bytes, expected 4")]
    ChecksumMalformed { len: usize },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("stored entry has {actual} bytes, caller expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Backend(BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
    #[error("existing entry could not be verified: {0}")]
    UnverifiedExisting(ReadFailure),
    #[error("data write failed: {0}")]
    Data(BackendError),
    #[error("checksum write failed: {0}")]
    Checksum(BackendError),
    #[error("checksum engine refused the payload")]
    UntrustedChecksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvsError {
    #[error("bad parameters: {0}")]
    BadParams(&'static str),
    #[error("key `{key}` must be 1..={max} characters")]
    KeyLength { key: String, max: usize },
    #[error("key `{0}` starts with the reserved checksum prefix")]
    ReservedKey(String),
    #[error("read of `{key}` failed: {reason}")]
    ReadFail { key: String, reason: ReadFailure },
    #[error("write of `{key}` failed: {reason}")]
    WriteFail { key: String, reason: WriteFailure },
    #[error("failed to open namespace `{namespace}` after {attempts} attempt(s): {source}")]
    Open {
        namespace: String,
        attempts: u8,
        source: BackendError,
    },
    #[error("erase of namespace failed: {0}")]
    Erase(BackendError),
    #[error("record `{key}` could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

impl KvsError {
    /// True when a standalone read failed only because the key was never written.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReadFail {
                reason: ReadFailure::NotFound,
                ..
            }
        )
    }
}

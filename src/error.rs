use std::fmt;

/// Result type for operations on the store.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// No free frame left in the buffer pool and none could be reclaimed.
    PoolExhausted,
    /// The free list and the bump region are both exhausted.
    NoSpace,
    /// A read or write against the backing file failed.
    Io(std::io::Error),
    /// A write would fall outside the bounds of a single page.
    OutOfPage { offset: usize, len: usize },
    /// A page failed to decode as a well-formed node: bad count, missing
    /// sentinel, or an object tag that isn't recognized.
    CorruptNode(String),
    /// An invariant the caller is responsible for upholding was violated.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolExhausted => write!(f, "buffer pool exhausted"),
            Error::NoSpace => write!(f, "backing file has no free pages"),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::OutOfPage { offset, len } => {
                write!(
                    f,
                    "write of {} bytes at offset {} exceeds page bounds",
                    len, offset
                )
            }
            Error::CorruptNode(desc) => write!(f, "corrupt node: {}", desc),
            Error::Internal(desc) => write!(f, "internal error: {}", desc),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

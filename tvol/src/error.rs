use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of data at offset {0}")]
    Truncated(usize),

    #[error("bad {what} magic: 0x{actual:X} (expected 0x{expected:X})")]
    BadMagic {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("bad key: {0}")]
    BadKey(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupted data: {0}")]
    Corrupt(String),

    #[error("not a recognized volume archive: {0}")]
    UnsupportedDialect(String),
}

pub type Result<T> = std::result::Result<T, VolumeError>;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset file `{0}` does not exist")]
    MissingFile(PathBuf),

    #[error("Dataset file `{0}` holds {1} bytes, expected at least {2}")]
    Truncated(PathBuf, u64, u64),

    #[error("Dataset file `{0}` starts with magic number {1:#010x}, expected {2:#010x}")]
    BadMagic(PathBuf, u32, u32),

    #[error("Dataset path `{0}` is not valid UTF-8")]
    InvalidPath(PathBuf),

    #[error("Dataset IO error: {0}")]
    Io(#[from] std::io::Error),
}

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type. Every fallible operation in `dbf` returns one of
/// these variants; see the individual modules for which ones they can raise.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough readable bytes in the buffer: expected {expected}, found {found}")]
    ShortRead { expected: usize, found: usize },

    #[error("value for field {field:?} does not fit in {width} bytes (needed {actual})")]
    Overflow {
        field: Option<String>,
        width: usize,
        actual: usize,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("DBF format error: {0}")]
    Format(String),

    #[error("missing required field: {0}")]
    InvalidArgument(String),
}

/// Crate's Result type.
pub type Result<T> = std::result::Result<T, Error>;

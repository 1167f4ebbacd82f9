use std::io;

use thiserror::Error;

use crate::secrets::SecretError;

/// Archive or queue write/read failure. Always best-effort at the call site.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
    #[error("encryption error: {0}")]
    Secret(#[from] SecretError),
    #[error("invalid archive month {0:?}")]
    InvalidMonth(String),
    #[error("pending item {0} is malformed")]
    MalformedItem(String),
}

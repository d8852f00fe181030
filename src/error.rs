//! Error type shared by the parsing, weighting and graph stages.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatNetError>;

#[derive(Debug, Error)]
pub enum ChatNetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-blank line that precedes every message-start line.
    #[error("line {line} does not belong to any message: {content:?}")]
    OrphanLine { line: usize, content: String },

    /// Matched the header pattern but is not a real date/time.
    #[error("line {line} has an invalid timestamp: {value:?}")]
    InvalidTimestamp { line: usize, value: String },

    #[error("unknown normalization type: {0:?}")]
    UnknownNormalization(String),

    #[error("weight column {0:?} requested more than once")]
    DuplicateColumn(String),

    #[error("weight column {0:?} is not present in the edge table")]
    MissingColumn(String),

    #[error("unknown node: {0:?}")]
    UnknownNode(String),

    #[error("settings error: {0}")]
    Settings(String),
}

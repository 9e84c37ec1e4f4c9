use crate::data::{Key, Mutation, RejectedMutation};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed for {principal}: {reason}")]
    Authentication { principal: String, reason: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{} mutation(s) rejected by the server", rejected.len())]
    PartialWrite { rejected: Vec<RejectedMutation> },

    #[error("Scan interrupted after {last_key:?}")]
    ScanInterrupted { last_key: Option<Key> },

    #[error("Write failed, {} mutation(s) not confirmed durable: {reason}", unconfirmed.len())]
    WriteFailed {
        unconfirmed: Vec<Mutation>,
        reason: Box<Error>,
    },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("Invalid visibility expression {expression:?}: {reason}")]
    InvalidVisibility { expression: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted store snapshot: {0}")]
    Corrupted(String),
}

impl Error {
    /// Transport-level failures and interrupted scans may be retried; everything
    /// else is surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::ScanInterrupted { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Authentication { .. } => -2,
            Error::TableNotFound(_) => -3,
            Error::TableExists(_) => -4,
            Error::Transport(_) => -5,
            Error::PartialWrite { .. } => -6,
            Error::ScanInterrupted { .. } => -7,
            Error::WriteFailed { .. } => -8,
            Error::SessionClosed => -9,
            Error::InvalidMutation(_) => -10,
            Error::InvalidVisibility { .. } => -11,
            Error::Config(_) => -12,
            Error::Serialization(_) => -13,
            Error::Corrupted(_) => -14,
        }
    }
}
